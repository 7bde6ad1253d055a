//! Pure resource topology for the cloud engineer agent - no I/O, no async.
//!
//! This crate provides:
//! - The configuration record, its validation and environment resolution
//! - A typed resource DAG and the builder that populates it
//! - Security notices, manifest serialisation and CloudFormation rendering
//! - Deploy-stage planning
//!
//! # Example
//!
//! ```
//! use agentstack_core::{build_topology, calculate_deploy_plan, Environment, StackOptions};
//!
//! let graph = build_topology(&StackOptions::reference(), &Environment::default()).unwrap();
//!
//! // Network and repository have no edge between them.
//! let waves = graph.waves().unwrap();
//! assert_eq!(waves[0][0].as_str(), "Network");
//!
//! let plan = calculate_deploy_plan(&graph).unwrap();
//! assert_eq!(plan.stage_count(), 2);
//! ```

pub mod cloudformation;
pub mod config;
mod error;
pub mod graph;
pub mod manifest;
pub mod resources;
pub mod schedule;
pub mod security;
pub mod topology;

pub use cloudformation::render_template;
pub use config::{Environment, StackConfig, StackOptions};
pub use error::{ConfigurationError, Result, ScheduleError, TemplateError, TopologyError};
pub use graph::{AttrRef, Attribute, Node, ResourceGraph, ResourceId, ResourceKind};
pub use manifest::Manifest;
pub use schedule::{
    calculate_deploy_plan, calculate_destroy_plan, format_deploy_plan, format_destroy_plan,
    DeployPlan, DeployStep, DestroyPlan, PlannedResource,
};
pub use security::{review, SecurityNotice, Severity};
pub use topology::{build_topology, TopologyBuilder};
