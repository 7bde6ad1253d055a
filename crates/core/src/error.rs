//! Core error types (pure - no I/O variants).

use thiserror::Error;

use crate::graph::{AttrRef, Attribute, ResourceId, ResourceKind};

/// A supplied parameter is absent, malformed, or violates a range/ordering rule.
///
/// `parameter` is always the canonical option name (`repositoryName`,
/// `containerPort`, ...), the same key used in configuration files.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing required parameter `{parameter}`")]
    Missing { parameter: &'static str },

    #[error("`{parameter}` must be between {min} and {max} (got {value})")]
    OutOfRange {
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("Invalid value for `{parameter}`: {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

impl ConfigurationError {
    /// Returns the name of the offending parameter.
    pub fn parameter(&self) -> &'static str {
        match self {
            Self::Missing { parameter }
            | Self::OutOfRange { parameter, .. }
            | Self::Invalid { parameter, .. } => parameter,
        }
    }

    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            parameter,
            reason: reason.into(),
        }
    }
}

/// Errors raised while constructing a resource graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A node references a node that has not been constructed yet.
    #[error("Resource `{from}` references `{to}`, which has not been constructed")]
    ResourceReference { from: ResourceId, to: ResourceId },

    #[error("Resource `{0}` is already defined")]
    DuplicateResource(ResourceId),

    #[error("Resource `{0}` is not part of the graph")]
    UnknownResource(ResourceId),

    #[error("Dependency cycle detected involving `{0}`")]
    Cycle(ResourceId),
}

/// Errors raised while rendering a graph for a provisioning engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("{kind} `{resource}` does not expose attribute `{attribute}`")]
    UnsupportedAttribute {
        resource: ResourceId,
        kind: ResourceKind,
        attribute: Attribute,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Errors raised while scheduling a graph into deploy steps.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The publish step needs the repository location as a stack output.
    #[error("Image build `{build}` pushes to `{repository}`, but no output exposes it")]
    UnexposedRepository { build: ResourceId, repository: AttrRef },

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
