//! Provision the cloud engineer agent stack.
//!
//! The topology is built by `agentstack_core`; this binary layers the
//! configuration, shows plans and drives CloudFormation, ECR and the local
//! container runtime.

use std::path::PathBuf;

use agentstack_core::Environment;
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config_file;
mod engine;
mod error;
mod options;
mod prelude;

use options::OverrideArgs;

/// Provision the cloud engineer agent stack
#[derive(Debug, Parser)]
#[command(name = "agentstack", version)]
#[command(about = "Provision the cloud engineer agent stack", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: Global,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Configuration file (defaults to ./agentstack.toml when present)
    #[arg(long, short, global = true, env = "AGENTSTACK_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use the reference deployment's open ingress and wildcard model scope
    #[arg(long, global = true)]
    pub reference_security: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Silence the command output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

impl Global {
    /// No decorative output: quiet, or stdout is reserved for JSON.
    pub fn is_silent(&self) -> bool {
        self.quiet || self.is_json()
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Write a configuration file with the reference deployment's values
    Init(commands::init::InitCommand),

    /// Validate the configuration and review its security posture
    Check(commands::inspect::CheckCommand),

    /// Emit the resource manifest or the CloudFormation template
    Synth(commands::inspect::SynthCommand),

    /// Show resources, dependency edges and reconciliation waves
    Graph,

    /// Show the deploy steps
    Plan,

    /// Provision the stack and publish the agent image
    Deploy(commands::deploy::DeployCommand),

    /// Delete the stack
    Destroy(commands::deploy::DestroyCommand),
}

fn init_tracing(global: &Global) {
    let default_filter = if global.is_verbose() {
        "agentstack=debug"
    } else if global.quiet {
        "agentstack=warn"
    } else {
        "agentstack=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.global);

    let environment = Environment::resolve(|name| std::env::var(name).ok())?;
    tracing::debug!(target_env = %environment.target_display(), "resolved environment");

    let context = commands::Context::new(cli.global, environment);

    match cli.command {
        Commands::Init(cmd) => commands::init::run(cmd, &context)?,
        Commands::Check(cmd) => commands::inspect::run_check(cmd, &context)?,
        Commands::Synth(cmd) => commands::inspect::run_synth(cmd, &context)?,
        Commands::Graph => commands::inspect::run_graph(&context)?,
        Commands::Plan => commands::inspect::run_plan(&context)?,
        Commands::Deploy(cmd) => commands::deploy::run_deploy(cmd, &context).await?,
        Commands::Destroy(cmd) => commands::deploy::run_destroy(cmd, &context).await?,
    }

    Ok(())
}
