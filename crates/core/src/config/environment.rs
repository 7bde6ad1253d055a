//! Target environment resolution.
//!
//! The account and region select where a graph is reconciled. They are
//! resolved once at program start from a lookup function so the rest of the
//! core never reads process state.

use serde::Serialize;

use crate::error::ConfigurationError;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Variable holding the target account identifier.
pub const ACCOUNT_VAR: &str = "AGENTSTACK_ACCOUNT";

/// Variable holding the target region.
pub const REGION_VAR: &str = "AGENTSTACK_REGION";

/// Region variable consulted when [`REGION_VAR`] is unset.
pub const FALLBACK_REGION_VAR: &str = "AWS_REGION";

/// Where a resource graph is reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Environment {
    /// Twelve-digit account identifier. `None` means "whatever the
    /// credentials resolve to".
    pub account: Option<String>,
    pub region: String,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            account: None,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

impl Environment {
    /// Creates a validated environment.
    pub fn new(
        account: Option<String>,
        region: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let region = region.into();
        if let Some(account) = &account {
            validate_account(account)?;
        }
        validate_region(&region)?;
        Ok(Self { account, region })
    }

    /// Resolves the environment from a variable lookup.
    ///
    /// Empty values are treated as unset. The region falls back to
    /// `AWS_REGION` and then to [`DEFAULT_REGION`].
    pub fn resolve<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let account = non_empty(ACCOUNT_VAR);
        let region = non_empty(REGION_VAR)
            .or_else(|| non_empty(FALLBACK_REGION_VAR))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Self::new(account, region)
    }

    /// Returns a display string for the target environment.
    pub fn target_display(&self) -> String {
        match &self.account {
            Some(account) => format!("account {} (region: {})", account, self.region),
            None => format!("default account (region: {})", self.region),
        }
    }
}

fn validate_account(account: &str) -> Result<(), ConfigurationError> {
    if account.len() == 12 && account.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(
            "account",
            format!("'{account}' is not a 12-digit account identifier"),
        ))
    }
}

fn validate_region(region: &str) -> Result<(), ConfigurationError> {
    let parts: Vec<&str> = region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts
            .iter()
            .all(|p| {
                !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            })
        && parts
            .last()
            .is_some_and(|p| p.chars().all(|c| c.is_ascii_digit()));

    if well_formed {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(
            "region",
            format!("'{region}' is not a region name (expected e.g. us-east-1)"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_resolve_defaults() {
        let env = Environment::resolve(lookup(&[])).unwrap();
        assert_eq!(env, Environment::default());
        assert_eq!(env.region, "us-east-1");
    }

    #[test]
    fn test_resolve_explicit_values() {
        let env = Environment::resolve(lookup(&[
            (ACCOUNT_VAR, "123456789012"),
            (REGION_VAR, "eu-west-1"),
            (FALLBACK_REGION_VAR, "us-west-2"),
        ]))
        .unwrap();
        assert_eq!(env.account.as_deref(), Some("123456789012"));
        assert_eq!(env.region, "eu-west-1");
    }

    #[test]
    fn test_resolve_falls_back_to_aws_region() {
        let env = Environment::resolve(lookup(&[(FALLBACK_REGION_VAR, "ap-southeast-2")])).unwrap();
        assert_eq!(env.region, "ap-southeast-2");
    }

    #[test]
    fn test_resolve_treats_empty_as_unset() {
        let env = Environment::resolve(lookup(&[(ACCOUNT_VAR, ""), (REGION_VAR, "  ")])).unwrap();
        assert_eq!(env.account, None);
        assert_eq!(env.region, DEFAULT_REGION);
    }

    #[test]
    fn test_invalid_account() {
        let error = Environment::resolve(lookup(&[(ACCOUNT_VAR, "12345")])).unwrap_err();
        assert_eq!(error.parameter(), "account");
    }

    #[test]
    fn test_invalid_region() {
        let error = Environment::new(None, "US_EAST").unwrap_err();
        assert_eq!(error.parameter(), "region");
        assert!(Environment::new(None, "us-gov-west-1").is_ok());
    }

    #[test]
    fn test_target_display() {
        let env = Environment::new(Some("123456789012".into()), "us-east-1").unwrap();
        assert_eq!(env.target_display(), "account 123456789012 (region: us-east-1)");
        assert_eq!(
            Environment::default().target_display(),
            "default account (region: us-east-1)"
        );
    }
}
