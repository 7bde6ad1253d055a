//! Turning a [`StackOptions`] record into a validated [`StackConfig`].

use super::cidr::Ipv4Cidr;
use super::environment::Environment;
use super::options::*;
use super::types::*;
use crate::error::ConfigurationError;

/// Fargate cpu values and the memory sizes each one supports.
const FARGATE_CPU_UNITS: [i64; 7] = [256, 512, 1024, 2048, 4096, 8192, 16384];

/// An application load balancer needs subnets in at least two zones.
const MIN_AVAILABILITY_ZONES: i64 = 2;

/// Subnets are pinned to `Fn::GetAZs` indices, so the count must exist in
/// every region.
const MAX_AVAILABILITY_ZONES: i64 = 6;

impl StackConfig {
    /// Applies defaults and validates every option.
    ///
    /// Fails on the first offending parameter.
    pub fn new(
        options: &StackOptions,
        environment: Environment,
    ) -> Result<Self, ConfigurationError> {
        let stack_name = options
            .stack_name
            .clone()
            .unwrap_or_else(|| DEFAULT_STACK_NAME.to_string());
        validate_stack_name(&stack_name)?;

        let network = validate_network(options)?;
        let repository = validate_repository(options)?;
        let image = validate_image(options)?;
        let task = validate_task(options)?;

        let desired_count = in_range(
            params::DESIRED_COUNT,
            options.desired_count.unwrap_or(DEFAULT_DESIRED_COUNT),
            0,
            i64::from(u32::MAX),
        )?;

        let load_balancer = validate_load_balancer(options)?;
        let security = validate_security(options, &network, &environment)?;

        Ok(Self {
            stack_name,
            environment,
            network,
            repository,
            image,
            task,
            service: ServiceConfig {
                desired_count: narrow(desired_count),
            },
            load_balancer,
            security,
        })
    }
}

fn validate_network(options: &StackOptions) -> Result<NetworkConfig, ConfigurationError> {
    let cidr_text = options.vpc_cidr.as_deref().unwrap_or(DEFAULT_VPC_CIDR);
    let cidr: Ipv4Cidr = cidr_text
        .parse()
        .map_err(|reason: String| ConfigurationError::invalid(params::VPC_CIDR, reason))?;
    if !(16..=28).contains(&cidr.prefix()) {
        return Err(ConfigurationError::invalid(
            params::VPC_CIDR,
            format!("prefix length must be between /16 and /28 (got /{})", cidr.prefix()),
        ));
    }

    let mask = in_range(
        params::SUBNET_CIDR_MASK,
        options.subnet_cidr_mask.unwrap_or(DEFAULT_SUBNET_CIDR_MASK),
        i64::from(cidr.prefix()),
        28,
    )?;
    let mask: u8 = narrow(mask);

    let max_azs = in_range(
        params::MAX_AVAILABILITY_ZONES,
        options
            .max_availability_zones
            .unwrap_or(DEFAULT_MAX_AVAILABILITY_ZONES),
        MIN_AVAILABILITY_ZONES,
        MAX_AVAILABILITY_ZONES,
    )?;

    let capacity = cidr.subnet_capacity(mask);
    if u64::try_from(max_azs).unwrap_or(u64::MAX) > capacity {
        return Err(ConfigurationError::invalid(
            params::MAX_AVAILABILITY_ZONES,
            format!("{max_azs} /{mask} subnets do not fit in {cidr} (room for {capacity})"),
        ));
    }

    Ok(NetworkConfig {
        cidr,
        max_availability_zones: narrow(max_azs),
        subnet_cidr_mask: mask,
    })
}

fn validate_repository(options: &StackOptions) -> Result<RepositoryConfig, ConfigurationError> {
    let name = options
        .repository_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(ConfigurationError::Missing {
            parameter: params::REPOSITORY_NAME,
        })?;

    if !is_valid_repository_name(name) {
        return Err(ConfigurationError::invalid(
            params::REPOSITORY_NAME,
            format!(
                "'{name}' must be 2-256 lowercase alphanumerics separated by '.', '_', '-' or '/'"
            ),
        ));
    }

    Ok(RepositoryConfig {
        name: name.to_string(),
        scan_on_push: options.scan_on_push.unwrap_or(true),
    })
}

fn validate_image(options: &StackOptions) -> Result<ImageConfig, ConfigurationError> {
    let directory = options
        .image_directory
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE_DIRECTORY.to_string());
    if directory.trim().is_empty() {
        return Err(ConfigurationError::invalid(
            params::IMAGE_DIRECTORY,
            "directory cannot be empty",
        ));
    }

    let exclude = options
        .image_exclude
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE_EXCLUDE.iter().map(|s| s.to_string()).collect());
    for entry in &exclude {
        if entry.trim().is_empty() {
            return Err(ConfigurationError::invalid(
                params::IMAGE_EXCLUDE,
                "entries cannot be empty",
            ));
        }
        if entry.starts_with('/') || entry.split('/').any(|c| c == "..") {
            return Err(ConfigurationError::invalid(
                params::IMAGE_EXCLUDE,
                format!("'{entry}' must be relative to the image directory"),
            ));
        }
        let name = entry.trim_start_matches("./").trim_end_matches('/');
        if name == "Dockerfile" {
            return Err(ConfigurationError::invalid(
                params::IMAGE_EXCLUDE,
                format!("'{entry}' would remove the Dockerfile from the build context"),
            ));
        }
    }

    let platform = options
        .image_platform
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE_PLATFORM.to_string());
    let parts: Vec<&str> = platform.split('/').collect();
    let platform_ok = (2..=3).contains(&parts.len())
        && parts.iter().all(|p| {
            !p.is_empty()
                && p.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        });
    if !platform_ok {
        return Err(ConfigurationError::invalid(
            params::IMAGE_PLATFORM,
            format!("'{platform}' is not an os/arch platform (e.g. linux/amd64)"),
        ));
    }

    let tag = options
        .image_tag
        .clone()
        .unwrap_or_else(|| DEFAULT_IMAGE_TAG.to_string());
    let tag_ok = !tag.is_empty()
        && tag.len() <= 128
        && tag
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !tag_ok {
        return Err(ConfigurationError::invalid(
            params::IMAGE_TAG,
            format!("'{tag}' is not a valid image tag"),
        ));
    }

    Ok(ImageConfig {
        directory,
        exclude,
        platform,
        tag,
    })
}

fn validate_task(options: &StackOptions) -> Result<TaskConfig, ConfigurationError> {
    let cpu = options.cpu_units.unwrap_or(DEFAULT_CPU_UNITS);
    let memory = options.memory_mib.unwrap_or(DEFAULT_MEMORY_MIB);
    validate_fargate_size(cpu, memory)?;

    let container_port = port(
        params::CONTAINER_PORT,
        options.container_port,
        DEFAULT_CONTAINER_PORT,
    )?;

    let log_stream_prefix = options
        .log_stream_prefix
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_STREAM_PREFIX.to_string());
    if log_stream_prefix.is_empty()
        || log_stream_prefix.contains(':')
        || log_stream_prefix.contains('*')
    {
        return Err(ConfigurationError::invalid(
            params::LOG_STREAM_PREFIX,
            "prefix must be non-empty and cannot contain ':' or '*'",
        ));
    }

    Ok(TaskConfig {
        cpu_units: narrow(cpu),
        memory_mib: narrow(memory),
        container_port,
        log_stream_prefix,
    })
}

fn validate_load_balancer(
    options: &StackOptions,
) -> Result<LoadBalancerConfig, ConfigurationError> {
    let listener_port = port(params::LISTENER_PORT, options.listener_port, DEFAULT_LISTENER_PORT)?;

    let path = options
        .health_check_path
        .clone()
        .unwrap_or_else(|| DEFAULT_HEALTH_CHECK_PATH.to_string());
    if !path.starts_with('/') || path.len() > 1024 || path.chars().any(char::is_whitespace) {
        return Err(ConfigurationError::invalid(
            params::HEALTH_CHECK_PATH,
            format!("'{path}' must be an absolute request path starting with '/'"),
        ));
    }

    let interval = in_range(
        params::HEALTH_CHECK_INTERVAL_SECONDS,
        options
            .health_check_interval_seconds
            .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS),
        5,
        300,
    )?;
    let timeout = in_range(
        params::HEALTH_CHECK_TIMEOUT_SECONDS,
        options
            .health_check_timeout_seconds
            .unwrap_or(DEFAULT_HEALTH_CHECK_TIMEOUT_SECONDS),
        2,
        120,
    )?;
    if timeout >= interval {
        return Err(ConfigurationError::invalid(
            params::HEALTH_CHECK_TIMEOUT_SECONDS,
            format!("timeout ({timeout}s) must be shorter than the interval ({interval}s)"),
        ));
    }

    Ok(LoadBalancerConfig {
        listener_port,
        health_check: HealthCheckConfig {
            path,
            interval_seconds: narrow(interval),
            timeout_seconds: narrow(timeout),
        },
    })
}

fn validate_security(
    options: &StackOptions,
    network: &NetworkConfig,
    environment: &Environment,
) -> Result<SecurityProfile, ConfigurationError> {
    let ingress_source = match options.security.ingress_source.as_deref() {
        Some(text) => text
            .parse::<Ipv4Cidr>()
            .map_err(|reason| ConfigurationError::invalid(params::INGRESS_SOURCE, reason))?,
        None => network.cidr,
    };

    let model_invocation_resources = match &options.security.model_invocation_resources {
        Some(resources) => resources.clone(),
        None => default_model_invocation_resources(environment),
    };
    if model_invocation_resources.is_empty() {
        return Err(ConfigurationError::invalid(
            params::MODEL_INVOCATION_RESOURCES,
            "at least one resource is required",
        ));
    }
    for resource in &model_invocation_resources {
        if resource != "*" && !resource.starts_with("arn:") {
            return Err(ConfigurationError::invalid(
                params::MODEL_INVOCATION_RESOURCES,
                format!("'{resource}' is neither an ARN nor '*'"),
            ));
        }
    }

    Ok(SecurityProfile {
        ingress_source,
        model_invocation_resources,
        read_only_access: options.security.read_only_access.unwrap_or(true),
    })
}

/// Foundation models in any region plus the account's inference profiles.
///
/// Inference profiles route across regions, so the region stays a wildcard.
pub fn default_model_invocation_resources(environment: &Environment) -> Vec<String> {
    let account = environment.account.as_deref().unwrap_or("*");
    vec![
        "arn:aws:bedrock:*::foundation-model/*".to_string(),
        format!("arn:aws:bedrock:*:{account}:inference-profile/*"),
    ]
}

/// Checks a cpu/memory pair against the sizes Fargate accepts.
pub fn validate_fargate_size(cpu: i64, memory: i64) -> Result<(), ConfigurationError> {
    let (min, max, step) = match cpu {
        256 => {
            return if [512, 1024, 2048].contains(&memory) {
                Ok(())
            } else {
                Err(ConfigurationError::invalid(
                    params::MEMORY_MIB,
                    format!("256 cpu units support 512, 1024 or 2048 MiB (got {memory})"),
                ))
            };
        }
        512 => (1024, 4096, 1024),
        1024 => (2048, 8192, 1024),
        2048 => (4096, 16384, 1024),
        4096 => (8192, 30720, 1024),
        8192 => (16384, 61440, 4096),
        16384 => (32768, 122880, 8192),
        _ => {
            return Err(ConfigurationError::invalid(
                params::CPU_UNITS,
                format!("{cpu} is not a Fargate size; use one of {FARGATE_CPU_UNITS:?}"),
            ))
        }
    };

    if (min..=max).contains(&memory) && (memory - min) % step == 0 {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(
            params::MEMORY_MIB,
            format!(
                "{cpu} cpu units support {min}-{max} MiB in {step} MiB increments (got {memory})"
            ),
        ))
    }
}

fn validate_stack_name(name: &str) -> Result<(), ConfigurationError> {
    let valid = name.len() <= 128
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::invalid(
            params::STACK_NAME,
            format!("'{name}' must start with a letter and contain only letters, digits and '-'"),
        ))
    }
}

/// Checks a repository name against registry naming rules.
///
/// Path segments are separated by '/'; inside a segment, lowercase
/// alphanumeric runs may be joined by single '.', '_' or '-' characters.
fn is_valid_repository_name(name: &str) -> bool {
    if !(2..=256).contains(&name.len()) {
        return false;
    }

    name.split('/').all(|segment| {
        let mut previous_was_separator = true;
        for c in segment.chars() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                previous_was_separator = false;
            } else if matches!(c, '.' | '_' | '-') && !previous_was_separator {
                previous_was_separator = true;
            } else {
                return false;
            }
        }
        !previous_was_separator
    })
}

fn port(
    parameter: &'static str,
    value: Option<i64>,
    default: i64,
) -> Result<u16, ConfigurationError> {
    let value = in_range(parameter, value.unwrap_or(default), 1, 65_535)?;
    Ok(narrow(value))
}

fn in_range(
    parameter: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<i64, ConfigurationError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigurationError::OutOfRange {
            parameter,
            value,
            min,
            max,
        })
    }
}

/// Narrows a value that has already been range-checked.
fn narrow<T>(value: i64) -> T
where
    T: TryFrom<i64> + Default,
{
    T::try_from(value).unwrap_or_default()
}
