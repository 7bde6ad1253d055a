//! Error types for the agentstack CLI.

use std::fmt;
use std::path::PathBuf;

use agentstack_core::{ConfigurationError, ScheduleError, TemplateError, TopologyError};
use thiserror::Error;

use crate::config_file::ConfigFileError;

/// Result type alias for the CLI.
pub type Result<T> = std::result::Result<T, CliError>;

/// A resource the provisioning engine failed to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    /// Engine diagnostic, unmodified.
    pub reason: String,
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {}: {}",
            self.logical_id, self.resource_type, self.status, self.reason
        )
    }
}

fn format_failures(failures: &[ResourceFailure]) -> String {
    if failures.is_empty() {
        return " (the engine reported no resource failures)".to_string();
    }
    failures
        .iter()
        .map(|failure| format!("\n  {failure}"))
        .collect()
}

/// Errors that can occur while running a command.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("{}: {source}", .path.display())]
    ConfigFile {
        path: PathBuf,
        source: ConfigFileError,
    },

    #[error("Configuration file '{}' not found", .0.display())]
    ConfigFileNotFound(PathBuf),

    #[error("Configuration file '{}' already exists (use --force to overwrite)", .0.display())]
    ConfigFileExists(PathBuf),

    /// The engine could not reconcile the stack.
    #[error("Stack '{stack_name}' ended in {status}:{}", format_failures(.failures))]
    Reconciliation {
        stack_name: String,
        status: String,
        failures: Vec<ResourceFailure>,
    },

    #[error("Timeout waiting for stack '{stack_name}' to settle")]
    StackTimeout { stack_name: String },

    #[error("Stack '{stack_name}' does not expose output '{output}'")]
    MissingOutput { stack_name: String, output: String },

    #[error("Credentials resolve to account {actual}, but the target account is {expected}")]
    AccountMismatch { expected: String, actual: String },

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Container runtime not found: {0}")]
    ContainerRuntimeNotFound(String),

    #[error("Image publication failed: {0}")]
    ImagePublish(String),

    #[error("Security review reported {count} warning(s)")]
    SecurityWarnings { count: usize },

    #[error("Operation cancelled by user")]
    UserCancelled,

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconciliation_error_keeps_engine_reasons() {
        let error = CliError::Reconciliation {
            stack_name: "Agent".to_string(),
            status: "ROLLBACK_COMPLETE".to_string(),
            failures: vec![ResourceFailure {
                logical_id: "ImageRepository".to_string(),
                resource_type: "AWS::ECR::Repository".to_string(),
                status: "CREATE_FAILED".to_string(),
                reason: "Resource handler returned message: \"agent already exists\"".to_string(),
            }],
        };
        assert_eq!(
            error.to_string(),
            "Stack 'Agent' ended in ROLLBACK_COMPLETE:\n  ImageRepository (AWS::ECR::Repository) CREATE_FAILED: Resource handler returned message: \"agent already exists\""
        );
    }

    #[test]
    fn test_reconciliation_error_without_failures() {
        let error = CliError::Reconciliation {
            stack_name: "Agent".to_string(),
            status: "UPDATE_ROLLBACK_COMPLETE".to_string(),
            failures: Vec::new(),
        };
        assert!(error.to_string().ends_with("(the engine reported no resource failures)"));
    }

    #[test]
    fn test_configuration_error_is_transparent() {
        let error: CliError = ConfigurationError::Missing {
            parameter: "repositoryName",
        }
        .into();
        assert_eq!(error.to_string(), "Missing required parameter `repositoryName`");
    }
}
