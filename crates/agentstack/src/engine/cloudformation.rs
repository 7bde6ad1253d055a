//! CloudFormation as provisioning engine (Imperative Shell).
//!
//! Every operation is tagged with a client request token so that, when a
//! stack fails to settle, only the events of that operation are reported.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::Capability;
use aws_sdk_cloudformation::Client;

use super::{ApplyOutcome, ProvisioningEngine};
use crate::error::{CliError, ResourceFailure, Result};

const ROLLBACK_COMPLETE: &str = "ROLLBACK_COMPLETE";
const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";
const MAX_EVENT_PAGES: usize = 10;

/// Where a stack is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    Succeeded,
    Failed,
}

/// Engine-neutral view of one stack event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    pub reason: Option<String>,
    pub token: Option<String>,
}

/// Pure function: Classify a stack status.
pub fn classify_status(status: &str) -> StackPhase {
    match status {
        "CREATE_COMPLETE" | "UPDATE_COMPLETE" | "IMPORT_COMPLETE" | "DELETE_COMPLETE" => {
            StackPhase::Succeeded
        }
        s if s.ends_with("_IN_PROGRESS") => StackPhase::InProgress,
        _ => StackPhase::Failed,
    }
}

/// Pure function: Resources that failed during the operation `token`,
/// oldest first. Events arrive newest first.
pub fn failed_resources(events: &[StackEvent], token: &str) -> Vec<ResourceFailure> {
    events
        .iter()
        .rev()
        .filter(|event| event.token.as_deref() == Some(token))
        .filter(|event| event.status.ends_with("_FAILED"))
        .filter(|event| event.resource_type != STACK_RESOURCE_TYPE)
        .map(|event| ResourceFailure {
            logical_id: event.logical_id.clone(),
            resource_type: event.resource_type.clone(),
            status: event.status.clone(),
            reason: event.reason.clone().unwrap_or_default(),
        })
        .collect()
}

/// Pure function: Whether an update was rejected only because the template
/// is unchanged.
pub fn is_no_update_error(message: &str) -> bool {
    message.contains("No updates are to be performed")
}

/// Pure function: Build a client request token for an operation.
pub fn request_token(operation: &str, millis: u128) -> String {
    format!("agentstack-{}-{}", operation, millis)
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn sdk_error<E>(error: E) -> CliError
where
    E: std::error::Error,
{
    CliError::AwsSdk(format!("{}", DisplayErrorContext(error)))
}

/// [`ProvisioningEngine`] backed by CloudFormation stacks.
pub struct CloudFormationEngine {
    client: Client,
    poll_interval: Duration,
    max_attempts: u32,
}

impl CloudFormationEngine {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
            poll_interval: Duration::from_secs(5),
            max_attempts: 360,
        }
    }

    /// Current stack status, `None` when the stack doesn't exist.
    async fn stack_status(&self, stack_name: &str) -> Result<Option<String>> {
        match self.client.describe_stacks().stack_name(stack_name).send().await {
            Ok(response) => Ok(response
                .stacks()
                .first()
                .and_then(|stack| stack.stack_status())
                .map(|status| status.as_str().to_string())),
            Err(err) => {
                let message = format!("{}", DisplayErrorContext(&err));
                if message.contains("does not exist") {
                    Ok(None)
                } else {
                    Err(CliError::AwsSdk(message))
                }
            }
        }
    }

    /// Polls until the stack is gone or no operation is in progress.
    async fn wait_for_terminal(&self, stack_name: &str) -> Result<Option<String>> {
        for _ in 0..self.max_attempts {
            match self.stack_status(stack_name).await? {
                Some(status) if classify_status(&status) == StackPhase::InProgress => {
                    tracing::debug!(stack = stack_name, status = %status, "waiting for stack");
                    tokio::time::sleep(self.poll_interval).await;
                }
                settled => return Ok(settled),
            }
        }

        Err(CliError::StackTimeout {
            stack_name: stack_name.to_string(),
        })
    }

    async fn events(&self, stack_name: &str) -> Result<Vec<StackEvent>> {
        let mut events = Vec::new();
        let mut next_token: Option<String> = None;

        for _ in 0..MAX_EVENT_PAGES {
            let response = self
                .client
                .describe_stack_events()
                .stack_name(stack_name)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(sdk_error)?;

            events.extend(response.stack_events().iter().map(|event| StackEvent {
                logical_id: event.logical_resource_id().unwrap_or_default().to_string(),
                resource_type: event.resource_type().unwrap_or_default().to_string(),
                status: event
                    .resource_status()
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_default(),
                reason: event.resource_status_reason().map(str::to_string),
                token: event.client_request_token().map(str::to_string),
            }));

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(events)
    }

    /// Turns the final status of an operation into a result.
    async fn settled(&self, stack_name: &str, token: &str, status: Option<String>) -> Result<()> {
        let Some(status) = status else {
            return Err(CliError::AwsSdk(format!(
                "stack '{}' disappeared while reconciling",
                stack_name
            )));
        };

        if classify_status(&status) == StackPhase::Succeeded {
            tracing::info!(stack = stack_name, status = %status, "stack settled");
            return Ok(());
        }

        let events = self.events(stack_name).await?;
        Err(CliError::Reconciliation {
            stack_name: stack_name.to_string(),
            status,
            failures: failed_resources(&events, token),
        })
    }

    async fn delete(&self, stack_name: &str) -> Result<()> {
        let token = request_token("delete", now_millis());
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .client_request_token(&token)
            .send()
            .await
            .map_err(sdk_error)?;

        match self.wait_for_terminal(stack_name).await? {
            None => Ok(()),
            Some(status) if status == "DELETE_COMPLETE" => Ok(()),
            status => self.settled(stack_name, &token, status).await,
        }
    }
}

#[async_trait]
impl ProvisioningEngine for CloudFormationEngine {
    async fn stack_exists(&self, stack_name: &str) -> Result<bool> {
        Ok(self.stack_status(stack_name).await?.is_some())
    }

    async fn apply(&self, stack_name: &str, template_body: &str) -> Result<ApplyOutcome> {
        let mut current = self.wait_for_terminal(stack_name).await?;

        // A stack whose creation rolled back cannot be updated.
        if current.as_deref() == Some(ROLLBACK_COMPLETE) {
            tracing::warn!(
                stack = stack_name,
                "stack is in ROLLBACK_COMPLETE after a failed creation, deleting it first"
            );
            self.delete(stack_name).await?;
            current = None;
        }

        let (outcome, token) = match current {
            None => {
                let token = request_token("create", now_millis());
                tracing::info!(stack = stack_name, "creating stack");
                self.client
                    .create_stack()
                    .stack_name(stack_name)
                    .template_body(template_body)
                    .capabilities(Capability::CapabilityIam)
                    .client_request_token(&token)
                    .send()
                    .await
                    .map_err(sdk_error)?;
                (ApplyOutcome::Created, token)
            }
            Some(_) => {
                let token = request_token("update", now_millis());
                tracing::info!(stack = stack_name, "updating stack");
                let response = self
                    .client
                    .update_stack()
                    .stack_name(stack_name)
                    .template_body(template_body)
                    .capabilities(Capability::CapabilityIam)
                    .client_request_token(&token)
                    .send()
                    .await;

                if let Err(err) = response {
                    let message = format!("{}", DisplayErrorContext(&err));
                    if is_no_update_error(&message) {
                        tracing::info!(stack = stack_name, "stack is up to date");
                        return Ok(ApplyOutcome::Unchanged);
                    }
                    return Err(CliError::AwsSdk(message));
                }
                (ApplyOutcome::Updated, token)
            }
        };

        let status = self.wait_for_terminal(stack_name).await?;
        self.settled(stack_name, &token, status).await?;
        Ok(outcome)
    }

    async fn outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>> {
        let response = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(response
            .stacks()
            .first()
            .map(|stack| {
                stack
                    .outputs()
                    .iter()
                    .filter_map(|output| {
                        Some((
                            output.output_key()?.to_string(),
                            output.output_value()?.to_string(),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn destroy(&self, stack_name: &str) -> Result<()> {
        tracing::info!(stack = stack_name, "deleting stack");
        self.delete(stack_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(logical_id: &str, status: &str, reason: Option<&str>, token: &str) -> StackEvent {
        StackEvent {
            logical_id: logical_id.to_string(),
            resource_type: if logical_id == "Agent" {
                STACK_RESOURCE_TYPE.to_string()
            } else {
                "AWS::ECR::Repository".to_string()
            },
            status: status.to_string(),
            reason: reason.map(str::to_string),
            token: Some(token.to_string()),
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status("CREATE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(classify_status("UPDATE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(classify_status("DELETE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(classify_status("CREATE_IN_PROGRESS"), StackPhase::InProgress);
        assert_eq!(
            classify_status("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            StackPhase::InProgress
        );
        assert_eq!(classify_status("ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(classify_status("UPDATE_ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(classify_status("DELETE_FAILED"), StackPhase::Failed);
    }

    #[test]
    fn test_failed_resources_only_from_current_operation() {
        // Newest first, as the engine returns them.
        let events = vec![
            event("Agent", "ROLLBACK_COMPLETE", None, "t2"),
            event("Repository", "DELETE_FAILED", Some("still has images"), "t2"),
            event("Repository", "CREATE_FAILED", Some("already exists"), "t2"),
            event("Agent", "CREATE_FAILED", Some("stack failed"), "t2"),
            event("Repository", "CREATE_FAILED", Some("old failure"), "t1"),
        ];

        let failures = failed_resources(&events, "t2");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].status, "CREATE_FAILED");
        assert_eq!(failures[0].reason, "already exists");
        assert_eq!(failures[1].reason, "still has images");
        assert!(failures.iter().all(|f| f.logical_id == "Repository"));
    }

    #[test]
    fn test_is_no_update_error() {
        assert!(is_no_update_error(
            "ValidationError: No updates are to be performed."
        ));
        assert!(!is_no_update_error("ValidationError: Template format error"));
    }

    #[test]
    fn test_request_token() {
        let token = request_token("create", 1_700_000_000_000);
        assert_eq!(token, "agentstack-create-1700000000000");
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }
}
