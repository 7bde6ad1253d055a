//! `agentstack init`: write a starting configuration file.

use std::path::PathBuf;

use agentstack_core::{StackConfig, StackOptions};

use super::{print_json, Context};
use crate::config_file::{write_options, DEFAULT_CONFIG_FILE};
use crate::error::Result;
use crate::options::layer_options;
use crate::prelude::*;

/// Write a configuration file with the reference deployment's values.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Write a configuration file with the reference deployment's values.

Security parameters are written with the scoped defaults (ingress from the
network range, Bedrock model ARNs, read-only access). Pass
--reference-security to write the reference deployment's open settings
instead. Option flags are written into the file as well.")]
pub struct InitCommand {
    /// Where to write the file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, value_name = "FILE")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Pure function: The options `init` writes.
pub fn initial_options(context: &Context) -> StackOptions {
    let mut reference = StackOptions::reference();
    reference.security.read_only_access = Some(true);
    layer_options(
        reference,
        context.global.reference_security,
        &context.global.overrides,
    )
}

pub fn run(cmd: InitCommand, context: &Context) -> Result<()> {
    let options = initial_options(context);

    // Never write a file that would fail validation.
    StackConfig::new(&options, context.environment.clone())?;

    write_options(&cmd.path, &options, cmd.force)?;
    tracing::debug!(path = %cmd.path.display(), "wrote configuration file");

    if context.global.is_json() {
        print_json(&serde_json::json!({ "path": cmd.path }))?;
    } else if !context.global.is_silent() {
        aprintln!("{} {}", p_g("Wrote"), cmd.path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OverrideArgs;
    use crate::{Global, OutputFormat};
    use agentstack_core::Environment;

    fn context(reference_security: bool, overrides: OverrideArgs) -> Context {
        Context::new(
            Global {
                config: None,
                reference_security,
                format: OutputFormat::Json,
                quiet: true,
                verbose: false,
                overrides,
            },
            Environment::default(),
        )
    }

    #[test]
    fn test_initial_options_are_the_reference() {
        let options = initial_options(&context(false, OverrideArgs::default()));
        assert_eq!(options.repository_name.as_deref(), Some("cloud-engineer-agent"));
        assert_eq!(options.container_port, Some(8501));
        assert_eq!(options.security.ingress_source, None);
        assert_eq!(options.security.read_only_access, Some(true));
    }

    #[test]
    fn test_initial_options_take_flags() {
        let overrides = OverrideArgs {
            repository_name: Some("my-agent".to_string()),
            ..OverrideArgs::default()
        };
        let options = initial_options(&context(true, overrides));
        assert_eq!(options.repository_name.as_deref(), Some("my-agent"));
        assert_eq!(options.security.ingress_source.as_deref(), Some("0.0.0.0/0"));
    }
}
