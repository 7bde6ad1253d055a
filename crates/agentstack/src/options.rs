//! Option layering: configuration file, reference security, then flags.

use std::path::{Path, PathBuf};

use agentstack_core::config::SecurityOptions;
use agentstack_core::StackOptions;

use crate::config_file::{self, DEFAULT_CONFIG_FILE};
use crate::error::Result;

/// Per-option overrides. Each flag takes precedence over the file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct OverrideArgs {
    /// Name of the provisioned stack
    #[arg(long, global = true, value_name = "NAME")]
    pub stack_name: Option<String>,

    /// Number of availability zones (one public subnet each)
    #[arg(long, global = true, value_name = "N", allow_negative_numbers = true)]
    pub max_availability_zones: Option<i64>,

    /// Address range of the network
    #[arg(long, global = true, value_name = "CIDR")]
    pub vpc_cidr: Option<String>,

    /// Prefix length of each subnet
    #[arg(long, global = true, value_name = "BITS", allow_negative_numbers = true)]
    pub subnet_cidr_mask: Option<i64>,

    /// Name of the image repository
    #[arg(long, global = true, value_name = "NAME")]
    pub repository_name: Option<String>,

    /// Scan images for vulnerabilities when pushed
    #[arg(long, global = true, value_name = "BOOL")]
    pub scan_on_push: Option<bool>,

    /// Image build context, relative to the configuration file
    #[arg(long, global = true, value_name = "DIR")]
    pub image_directory: Option<String>,

    /// Paths left out of the build context (comma separated)
    #[arg(long, global = true, value_name = "PATHS", value_delimiter = ',')]
    pub image_exclude: Vec<String>,

    /// Target platform of the image build
    #[arg(long, global = true, value_name = "OS/ARCH")]
    pub image_platform: Option<String>,

    /// Tag pushed to the repository
    #[arg(long, global = true, value_name = "TAG")]
    pub image_tag: Option<String>,

    /// Task CPU units
    #[arg(long, global = true, value_name = "UNITS", allow_negative_numbers = true)]
    pub cpu_units: Option<i64>,

    /// Task memory in MiB
    #[arg(long = "memory-mib", global = true, value_name = "MIB", allow_negative_numbers = true)]
    pub memory_mib: Option<i64>,

    /// Port the container listens on
    #[arg(long, global = true, value_name = "PORT", allow_negative_numbers = true)]
    pub container_port: Option<i64>,

    /// Public port of the load balancer listener
    #[arg(long, global = true, value_name = "PORT", allow_negative_numbers = true)]
    pub listener_port: Option<i64>,

    /// Number of running tasks
    #[arg(long, global = true, value_name = "N", allow_negative_numbers = true)]
    pub desired_count: Option<i64>,

    /// Prefix of the container log streams
    #[arg(long, global = true, value_name = "PREFIX")]
    pub log_stream_prefix: Option<String>,

    /// Path probed by the target group health check
    #[arg(long, global = true, value_name = "PATH")]
    pub health_check_path: Option<String>,

    /// Seconds between health checks
    #[arg(long, global = true, value_name = "SECONDS", allow_negative_numbers = true)]
    pub health_check_interval_seconds: Option<i64>,

    /// Seconds before a health check times out
    #[arg(long, global = true, value_name = "SECONDS", allow_negative_numbers = true)]
    pub health_check_timeout_seconds: Option<i64>,

    /// Source range allowed to reach the container port
    #[arg(long, global = true, value_name = "CIDR")]
    pub ingress_source: Option<String>,

    /// Resources the task may invoke models on (comma separated)
    #[arg(long, global = true, value_name = "ARNS", value_delimiter = ',')]
    pub model_invocation_resources: Vec<String>,

    /// Attach the account-wide read-only policy to the task role
    #[arg(long, global = true, value_name = "BOOL")]
    pub read_only_access: Option<bool>,
}

impl OverrideArgs {
    /// Converts the flags into an options record; unset flags stay unset.
    pub fn to_options(&self) -> StackOptions {
        let non_empty = |values: &Vec<String>| (!values.is_empty()).then(|| values.clone());

        StackOptions {
            stack_name: self.stack_name.clone(),
            max_availability_zones: self.max_availability_zones,
            vpc_cidr: self.vpc_cidr.clone(),
            subnet_cidr_mask: self.subnet_cidr_mask,
            repository_name: self.repository_name.clone(),
            scan_on_push: self.scan_on_push,
            image_directory: self.image_directory.clone(),
            image_exclude: non_empty(&self.image_exclude),
            image_platform: self.image_platform.clone(),
            image_tag: self.image_tag.clone(),
            cpu_units: self.cpu_units,
            memory_mib: self.memory_mib,
            container_port: self.container_port,
            listener_port: self.listener_port,
            desired_count: self.desired_count,
            log_stream_prefix: self.log_stream_prefix.clone(),
            health_check_path: self.health_check_path.clone(),
            health_check_interval_seconds: self.health_check_interval_seconds,
            health_check_timeout_seconds: self.health_check_timeout_seconds,
            security: SecurityOptions {
                ingress_source: self.ingress_source.clone(),
                model_invocation_resources: non_empty(&self.model_invocation_resources),
                read_only_access: self.read_only_access,
            },
        }
    }
}

/// Options after layering, plus where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub options: StackOptions,
    /// Configuration file that was read, if any.
    pub source: Option<PathBuf>,
    /// Directory relative paths in the options are resolved against.
    pub base_dir: PathBuf,
}

impl ResolvedOptions {
    /// Resolves a path from the options against [`ResolvedOptions::base_dir`].
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

/// Pure function: Layer file options, reference security and flag overrides.
pub fn layer_options(
    file: StackOptions,
    reference_security: bool,
    overrides: &OverrideArgs,
) -> StackOptions {
    let layered = if reference_security {
        file.merge(StackOptions::reference_security())
    } else {
        file
    };
    layered.merge(overrides.to_options())
}

/// Reads the configuration file (explicit, or the default one when present)
/// and layers the command-line overrides on top.
pub fn resolve_options(
    config: Option<&Path>,
    reference_security: bool,
    overrides: &OverrideArgs,
) -> Result<ResolvedOptions> {
    let source = match config {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|path| path.is_file()),
    };

    let file = match &source {
        Some(path) => {
            tracing::debug!(path = %path.display(), "reading configuration file");
            config_file::load_options(path)?
        }
        None => {
            tracing::debug!("no configuration file, using flags and defaults");
            StackOptions::default()
        }
    };

    let base_dir = source
        .as_deref()
        .and_then(Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(ResolvedOptions {
        options: layer_options(file, reference_security, overrides),
        source,
        base_dir,
    })
}
