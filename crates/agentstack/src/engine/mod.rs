//! External collaborators: the provisioning engine and the image publisher.
//!
//! Commands talk to these traits only; the AWS-backed implementations live
//! in the submodules.

mod client;
mod cloudformation;
mod context;
mod registry;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{caller_account, load_sdk_config, verify_account, AwsConfig};
pub use cloudformation::CloudFormationEngine;
pub use registry::{detect_runtime, RegistryPublisher};

/// What an apply did to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

impl ApplyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Reconciles templates against live state.
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    async fn stack_exists(&self, stack_name: &str) -> Result<bool>;

    /// Creates or updates the stack and waits until it settles.
    async fn apply(&self, stack_name: &str, template_body: &str) -> Result<ApplyOutcome>;

    /// Output values of a settled stack.
    async fn outputs(&self, stack_name: &str) -> Result<BTreeMap<String, String>>;

    /// Deletes the stack and waits until it is gone.
    async fn destroy(&self, stack_name: &str) -> Result<()>;
}

/// An image to build and push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub repository_uri: String,
    pub tag: String,
    pub directory: PathBuf,
    pub exclude: Vec<String>,
    pub platform: String,
}

impl PublishRequest {
    /// Full image reference, `<repository>:<tag>`.
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.repository_uri, self.tag)
    }
}

/// Builds images and pushes them to a registry.
#[async_trait]
pub trait ImagePublisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<()>;
}
