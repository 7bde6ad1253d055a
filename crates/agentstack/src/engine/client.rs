//! AWS SDK client setup (Imperative Shell).

use agentstack_core::Environment;
use aws_config::SdkConfig;

use crate::error::{CliError, Result};

/// AWS client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    /// Custom endpoint URL (for local emulators).
    pub endpoint_url: Option<String>,
    pub region: String,
}

impl AwsConfig {
    /// Targets the environment's region. `AWS_ENDPOINT_URL` is honoured
    /// when set.
    pub fn new(environment: &Environment) -> Self {
        Self {
            endpoint_url: std::env::var("AWS_ENDPOINT_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            region: environment.region.clone(),
        }
    }

    /// Returns a display string for the target endpoint.
    pub fn target_display(&self) -> String {
        match &self.endpoint_url {
            Some(url) => format!("Local endpoint ({}, region: {})", url, self.region),
            None => format!("AWS (region: {})", self.region),
        }
    }
}

/// Loads shared SDK configuration for every client.
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    loader.load().await
}

/// Account the loaded credentials belong to.
pub async fn caller_account(sdk_config: &SdkConfig) -> Result<String> {
    let client = aws_sdk_sts::Client::new(sdk_config);
    let identity = client
        .get_caller_identity()
        .send()
        .await
        .map_err(|e| {
            CliError::AwsSdk(format!(
                "{}",
                aws_sdk_sts::error::DisplayErrorContext(&e)
            ))
        })?;

    identity
        .account()
        .map(str::to_string)
        .ok_or_else(|| CliError::AwsSdk("caller identity has no account".to_string()))
}

/// Pure function: Check the credentials' account against the target.
pub fn verify_account(expected: Option<&str>, actual: &str) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(CliError::AccountMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_account() {
        assert!(verify_account(None, "123456789012").is_ok());
        assert!(verify_account(Some("123456789012"), "123456789012").is_ok());

        let error = verify_account(Some("123456789012"), "210987654321").unwrap_err();
        assert!(matches!(error, CliError::AccountMismatch { .. }));
        assert_eq!(
            error.to_string(),
            "Credentials resolve to account 210987654321, but the target account is 123456789012"
        );
    }

    #[test]
    fn test_target_display() {
        let config = AwsConfig {
            endpoint_url: None,
            region: "eu-west-1".to_string(),
        };
        assert_eq!(config.target_display(), "AWS (region: eu-west-1)");

        let local = AwsConfig {
            endpoint_url: Some("http://localhost:4566".to_string()),
            region: "us-east-1".to_string(),
        };
        assert_eq!(
            local.target_display(),
            "Local endpoint (http://localhost:4566, region: us-east-1)"
        );
    }
}
