//! Subcommands.

pub mod deploy;
pub mod init;
pub mod inspect;

use agentstack_core::{
    review, Environment, ResourceGraph, SecurityNotice, Severity, StackConfig, TopologyBuilder,
};

use crate::error::Result;
use crate::options::{resolve_options, ResolvedOptions};
use crate::prelude::*;
use crate::Global;

/// Description written into rendered templates.
pub const TEMPLATE_DESCRIPTION: &str =
    "Cloud engineer agent: network, image repository, container service and load balancer";

/// State shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub global: Global,
    pub environment: Environment,
}

/// A validated configuration and the graph built from it.
#[derive(Debug, Clone)]
pub struct Stack {
    pub resolved: ResolvedOptions,
    pub config: StackConfig,
    pub graph: ResourceGraph,
}

impl Context {
    pub fn new(global: Global, environment: Environment) -> Self {
        Self {
            global,
            environment,
        }
    }

    /// Layers the options without validating them.
    pub fn options(&self) -> Result<ResolvedOptions> {
        resolve_options(
            self.global.config.as_deref(),
            self.global.reference_security,
            &self.global.overrides,
        )
    }

    /// Layers, validates and builds the resource graph.
    pub fn stack(&self) -> Result<Stack> {
        let resolved = self.options()?;
        let config = StackConfig::new(&resolved.options, self.environment.clone())?;
        let graph = TopologyBuilder::new(config.clone()).build()?;
        tracing::debug!(
            stack = %config.stack_name,
            resources = graph.len(),
            "built resource graph"
        );

        Ok(Stack {
            resolved,
            config,
            graph,
        })
    }
}

/// Prints security notices to stderr. Info notices are only shown in
/// verbose mode.
pub fn print_notices(notices: &[SecurityNotice], global: &Global) {
    for notice in notices {
        match notice.severity {
            Severity::Warning => tracing::warn!(parameter = notice.parameter, "{}", notice.message),
            Severity::Info if global.is_verbose() => {
                aeprintln!("{}", p_c(&notice.to_string()))
            }
            Severity::Info => {}
        }
    }
}

/// Reviews the configuration and reports any warnings.
pub fn report_security(config: &StackConfig, global: &Global) -> Vec<SecurityNotice> {
    let notices = review(config);
    print_notices(&notices, global);
    notices
}

/// Prints a JSON value to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    aprintln!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
