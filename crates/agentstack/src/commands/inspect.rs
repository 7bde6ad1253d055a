//! Offline commands: `check`, `synth`, `graph` and `plan`.

use std::path::PathBuf;

use agentstack_core::security::has_warnings;
use agentstack_core::{
    calculate_deploy_plan, format_deploy_plan, render_template, review, Manifest, ResourceGraph,
    Severity,
};
use serde_json::json;

use super::{print_json, report_security, Context, TEMPLATE_DESCRIPTION};
use crate::error::{CliError, Result};
use crate::prelude::*;

/// Validate the configuration and review its security posture.
#[derive(Debug, clap::Parser)]
pub struct CheckCommand {
    /// Fail when the security review reports warnings
    #[arg(long)]
    pub strict: bool,
}

/// Emit the resource manifest or the CloudFormation template.
#[derive(Debug, clap::Parser)]
pub struct SynthCommand {
    /// Emit the CloudFormation template instead of the manifest
    #[arg(long)]
    pub template: bool,

    /// Write to a file instead of stdout
    #[arg(long, short, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

pub fn run_check(cmd: CheckCommand, context: &Context) -> Result<()> {
    let stack = context.stack()?;
    let notices = review(&stack.config);
    let global = &context.global;

    if global.is_json() {
        print_json(&json!({
            "valid": true,
            "stackName": stack.config.stack_name,
            "environment": stack.config.environment,
            "configFile": stack.resolved.source,
            "resources": stack.graph.len(),
            "notices": notices,
        }))?;
    } else if !global.is_silent() {
        let source = stack
            .resolved
            .source
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(defaults and flags)".to_string());

        aprintln!("{} {}", p_b("Target:"), context.environment.target_display());
        aprintln!("{} {}", p_b("Config:"), source);
        aprintln!("{} {}", p_b("Stack:"), stack.config.stack_name);
        aprintln!("{} {}", p_b("Resources:"), stack.graph.len());
        aprintln!();
        aprintln!("{}", p_c("Security review:"));
        for notice in &notices {
            let line = notice.to_string();
            match notice.severity {
                Severity::Warning => aprintln!("  {}", p_y(&line)),
                Severity::Info => aprintln!("  {}", line),
            }
        }
        aprintln!();
        aprintln!("{}", p_g("Configuration is valid."));
    }

    if cmd.strict && has_warnings(&notices) {
        return Err(CliError::SecurityWarnings {
            count: notices
                .iter()
                .filter(|notice| notice.severity == Severity::Warning)
                .count(),
        });
    }

    Ok(())
}

pub fn run_synth(cmd: SynthCommand, context: &Context) -> Result<()> {
    let stack = context.stack()?;
    report_security(&stack.config, &context.global);

    let document = if cmd.template {
        let template = render_template(&stack.graph, TEMPLATE_DESCRIPTION)?;
        serde_json::to_string_pretty(&template)?
    } else {
        Manifest::from_graph(&stack.config, &stack.graph)?.to_json()?
    };

    match &cmd.out {
        Some(path) => {
            std::fs::write(path, format!("{document}\n"))?;
            if !context.global.is_silent() {
                aeprintln!("{} {}", p_g("Wrote"), path.display());
            }
        }
        None => aprintln!("{}", document),
    }

    Ok(())
}

/// Pure function: Describe the graph as display lines.
pub fn format_graph(graph: &ResourceGraph) -> Result<Vec<String>> {
    let mut lines = vec![format!("Resources ({}):", graph.len())];
    for node in graph.nodes() {
        lines.push(format!("  {} ({})", node.id, node.kind));
    }

    lines.push("Waves:".to_string());
    for (index, wave) in graph.waves()?.iter().enumerate() {
        let ids: Vec<&str> = wave.iter().map(|id| id.as_str()).collect();
        lines.push(format!("  {}: {}", index + 1, ids.join(", ")));
    }

    lines.push("Dependencies:".to_string());
    for (dependent, dependency) in graph.edges() {
        lines.push(format!("  {} -> {}", dependent, dependency));
    }

    Ok(lines)
}

pub fn run_graph(context: &Context) -> Result<()> {
    let stack = context.stack()?;
    let graph = &stack.graph;

    if context.global.is_json() {
        let nodes: Vec<_> = graph
            .nodes()
            .iter()
            .map(|node| json!({ "id": node.id, "kind": node.kind, "dependsOn": node.depends_on }))
            .collect();
        let edges: Vec<_> = graph
            .edges()
            .into_iter()
            .map(|(from, to)| json!({ "from": from, "to": to }))
            .collect();
        return print_json(&json!({
            "nodes": nodes,
            "edges": edges,
            "waves": graph.waves()?,
        }));
    }
    if context.global.is_silent() {
        return Ok(());
    }

    for line in format_graph(graph)? {
        if line.starts_with(' ') {
            aprintln!("{}", line);
        } else {
            aprintln!("{}", p_c(&line));
        }
    }
    Ok(())
}

pub fn run_plan(context: &Context) -> Result<()> {
    let stack = context.stack()?;
    report_security(&stack.config, &context.global);
    let plan = calculate_deploy_plan(&stack.graph)?;

    if context.global.is_json() {
        return print_json(&plan);
    }
    if context.global.is_silent() {
        return Ok(());
    }

    aprintln!("{} {}", p_b("Target:"), context.environment.target_display());
    aprintln!("{} {}", p_b("Stack:"), stack.config.stack_name);
    aprintln!();
    aprintln!("{}", p_c("Deploy Plan:"));
    for line in format_deploy_plan(&plan) {
        aprintln!("  {}", paint_plan_line(&line));
    }
    Ok(())
}
