//! Operator notices about the security posture of a configuration.
//!
//! The reference deployment was a demo: open ingress, wildcard model
//! invocation and account-wide read-only access. Broad settings are reported
//! as warnings, and every departure from the reference is reported as
//! information so that neither choice is ever silent.

use std::fmt;

use serde::Serialize;

use crate::config::{
    params, StackConfig, REFERENCE_INGRESS_SOURCE, REFERENCE_MODEL_INVOCATION_RESOURCE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityNotice {
    pub severity: Severity,
    pub parameter: &'static str,
    pub message: String,
}

impl SecurityNotice {
    fn warning(parameter: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            parameter,
            message: message.into(),
        }
    }

    fn info(parameter: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            parameter,
            message: message.into(),
        }
    }
}

impl fmt::Display for SecurityNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: `{}` {}", self.severity, self.parameter, self.message)
    }
}

/// Reviews the security parameters of a validated configuration.
///
/// Warnings come first, then informational notices, each in parameter order.
pub fn review(config: &StackConfig) -> Vec<SecurityNotice> {
    let security = &config.security;
    let mut notices = Vec::new();

    if security.ingress_source.is_any() {
        notices.push(SecurityNotice::warning(
            params::INGRESS_SOURCE,
            format!(
                "allows the whole internet to reach container port {} directly, bypassing the load balancer",
                config.task.container_port
            ),
        ));
    } else {
        notices.push(SecurityNotice::info(
            params::INGRESS_SOURCE,
            format!(
                "is {} (reference deployment: {})",
                security.ingress_source, REFERENCE_INGRESS_SOURCE
            ),
        ));
    }

    let wildcard = security
        .model_invocation_resources
        .iter()
        .any(|r| r == REFERENCE_MODEL_INVOCATION_RESOURCE);
    if wildcard {
        notices.push(SecurityNotice::warning(
            params::MODEL_INVOCATION_RESOURCES,
            "lets the task role invoke any model or resource (`*`)",
        ));
    } else {
        notices.push(SecurityNotice::info(
            params::MODEL_INVOCATION_RESOURCES,
            format!(
                "is scoped to {} (reference deployment: {})",
                security.model_invocation_resources.join(", "),
                REFERENCE_MODEL_INVOCATION_RESOURCE
            ),
        ));
    }

    if security.read_only_access {
        notices.push(SecurityNotice::warning(
            params::READ_ONLY_ACCESS,
            "grants the task role read-only access to every resource in the account",
        ));
    } else {
        notices.push(SecurityNotice::info(
            params::READ_ONLY_ACCESS,
            "is disabled (reference deployment: enabled); the agent cannot inspect account resources",
        ));
    }

    notices.sort_by(|a, b| b.severity.cmp(&a.severity));
    notices
}

/// True when any notice is a warning.
pub fn has_warnings(notices: &[SecurityNotice]) -> bool {
    notices.iter().any(|n| n.severity == Severity::Warning)
}
