//! Configuration file (`agentstack.toml`) reading and writing.
//!
//! Keys are the canonical option names, so a bad value in the file is
//! reported with the same name validation uses. Unknown keys are rejected.

use std::path::Path;

use agentstack_core::config::{params, SecurityOptions, StackOptions};
use thiserror::Error;
use toml_edit::{Array, DocumentMut, Item, Table};

use crate::error::{CliError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "agentstack.toml";

const HEADER: &str = "\
# agentstack configuration.
#
# Every key is optional except repositoryName. Command-line flags take
# precedence over the values in this file.
";

const SECURITY_COMMENT: &str = "
# Unset security values use scoped defaults: ingress from vpcCidr only and
# Bedrock model ARNs for invocation. `--reference-security` restores the
# reference deployment's 0.0.0.0/0 ingress and `*` invocation scope.
";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigFileError {
    #[error("invalid TOML: {0}")]
    Syntax(String),

    #[error("unknown option `{0}`")]
    UnknownOption(String),

    #[error("`{parameter}` must be {expected}")]
    Type {
        parameter: &'static str,
        expected: &'static str,
    },
}

type ParseResult<T> = std::result::Result<T, ConfigFileError>;

/// Reads a configuration file.
pub fn load_options(path: &Path) -> Result<StackOptions> {
    if !path.exists() {
        return Err(CliError::ConfigFileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_options(&content).map_err(|source| CliError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `options` to `path`, refusing to overwrite unless `force` is set.
pub fn write_options(path: &Path, options: &StackOptions, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(CliError::ConfigFileExists(path.to_path_buf()));
    }
    std::fs::write(path, render_options(options))?;
    Ok(())
}

/// Pure function: Parse a configuration document into a record.
pub fn parse_options(content: &str) -> ParseResult<StackOptions> {
    let doc = content
        .parse::<DocumentMut>()
        .map_err(|e| ConfigFileError::Syntax(e.to_string()))?;

    let mut options = StackOptions::default();
    for (key, item) in doc.iter() {
        match key {
            params::STACK_NAME => options.stack_name = Some(string(params::STACK_NAME, item)?),
            params::MAX_AVAILABILITY_ZONES => {
                options.max_availability_zones =
                    Some(integer(params::MAX_AVAILABILITY_ZONES, item)?)
            }
            params::VPC_CIDR => options.vpc_cidr = Some(string(params::VPC_CIDR, item)?),
            params::SUBNET_CIDR_MASK => {
                options.subnet_cidr_mask = Some(integer(params::SUBNET_CIDR_MASK, item)?)
            }
            params::REPOSITORY_NAME => {
                options.repository_name = Some(string(params::REPOSITORY_NAME, item)?)
            }
            params::SCAN_ON_PUSH => {
                options.scan_on_push = Some(boolean(params::SCAN_ON_PUSH, item)?)
            }
            params::IMAGE_DIRECTORY => {
                options.image_directory = Some(string(params::IMAGE_DIRECTORY, item)?)
            }
            params::IMAGE_EXCLUDE => {
                options.image_exclude = Some(string_list(params::IMAGE_EXCLUDE, item)?)
            }
            params::IMAGE_PLATFORM => {
                options.image_platform = Some(string(params::IMAGE_PLATFORM, item)?)
            }
            params::IMAGE_TAG => options.image_tag = Some(string(params::IMAGE_TAG, item)?),
            params::CPU_UNITS => options.cpu_units = Some(integer(params::CPU_UNITS, item)?),
            params::MEMORY_MIB => options.memory_mib = Some(integer(params::MEMORY_MIB, item)?),
            params::CONTAINER_PORT => {
                options.container_port = Some(integer(params::CONTAINER_PORT, item)?)
            }
            params::LISTENER_PORT => {
                options.listener_port = Some(integer(params::LISTENER_PORT, item)?)
            }
            params::DESIRED_COUNT => {
                options.desired_count = Some(integer(params::DESIRED_COUNT, item)?)
            }
            params::LOG_STREAM_PREFIX => {
                options.log_stream_prefix = Some(string(params::LOG_STREAM_PREFIX, item)?)
            }
            params::HEALTH_CHECK_PATH => {
                options.health_check_path = Some(string(params::HEALTH_CHECK_PATH, item)?)
            }
            params::HEALTH_CHECK_INTERVAL_SECONDS => {
                options.health_check_interval_seconds =
                    Some(integer(params::HEALTH_CHECK_INTERVAL_SECONDS, item)?)
            }
            params::HEALTH_CHECK_TIMEOUT_SECONDS => {
                options.health_check_timeout_seconds =
                    Some(integer(params::HEALTH_CHECK_TIMEOUT_SECONDS, item)?)
            }
            params::SECURITY => options.security = security(item)?,
            other => return Err(ConfigFileError::UnknownOption(other.to_string())),
        }
    }

    Ok(options)
}

fn security(item: &Item) -> ParseResult<SecurityOptions> {
    let table = item.as_table_like().ok_or(ConfigFileError::Type {
        parameter: params::SECURITY,
        expected: "a table",
    })?;

    let mut security = SecurityOptions::default();
    for (key, item) in table.iter() {
        let qualified = format!("{}.{key}", params::SECURITY);
        match qualified.as_str() {
            params::INGRESS_SOURCE => {
                security.ingress_source = Some(string(params::INGRESS_SOURCE, item)?)
            }
            params::MODEL_INVOCATION_RESOURCES => {
                security.model_invocation_resources =
                    Some(string_list(params::MODEL_INVOCATION_RESOURCES, item)?)
            }
            params::READ_ONLY_ACCESS => {
                security.read_only_access = Some(boolean(params::READ_ONLY_ACCESS, item)?)
            }
            _ => return Err(ConfigFileError::UnknownOption(qualified)),
        }
    }
    Ok(security)
}

fn string(parameter: &'static str, item: &Item) -> ParseResult<String> {
    item.as_str().map(str::to_string).ok_or(ConfigFileError::Type {
        parameter,
        expected: "a string",
    })
}

fn integer(parameter: &'static str, item: &Item) -> ParseResult<i64> {
    item.as_integer().ok_or(ConfigFileError::Type {
        parameter,
        expected: "an integer",
    })
}

fn boolean(parameter: &'static str, item: &Item) -> ParseResult<bool> {
    item.as_bool().ok_or(ConfigFileError::Type {
        parameter,
        expected: "a boolean",
    })
}

fn string_list(parameter: &'static str, item: &Item) -> ParseResult<Vec<String>> {
    let error = ConfigFileError::Type {
        parameter,
        expected: "an array of strings",
    };
    let array = item.as_array().ok_or_else(|| error.clone())?;
    array
        .iter()
        .map(|value| value.as_str().map(str::to_string).ok_or_else(|| error.clone()))
        .collect()
}

/// Pure function: Render a record as a configuration document.
pub fn render_options(options: &StackOptions) -> String {
    let mut doc = DocumentMut::new();

    let strings = [
        (params::STACK_NAME, &options.stack_name),
        (params::REPOSITORY_NAME, &options.repository_name),
        (params::VPC_CIDR, &options.vpc_cidr),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            doc[key] = toml_edit::value(value.as_str());
        }
    }

    let integers = [
        (params::MAX_AVAILABILITY_ZONES, options.max_availability_zones),
        (params::SUBNET_CIDR_MASK, options.subnet_cidr_mask),
        (params::CPU_UNITS, options.cpu_units),
        (params::MEMORY_MIB, options.memory_mib),
        (params::CONTAINER_PORT, options.container_port),
        (params::LISTENER_PORT, options.listener_port),
        (params::DESIRED_COUNT, options.desired_count),
        (params::HEALTH_CHECK_INTERVAL_SECONDS, options.health_check_interval_seconds),
        (params::HEALTH_CHECK_TIMEOUT_SECONDS, options.health_check_timeout_seconds),
    ];
    for (key, value) in integers {
        if let Some(value) = value {
            doc[key] = toml_edit::value(value);
        }
    }

    let more_strings = [
        (params::HEALTH_CHECK_PATH, &options.health_check_path),
        (params::LOG_STREAM_PREFIX, &options.log_stream_prefix),
        (params::IMAGE_DIRECTORY, &options.image_directory),
        (params::IMAGE_PLATFORM, &options.image_platform),
        (params::IMAGE_TAG, &options.image_tag),
    ];
    for (key, value) in more_strings {
        if let Some(value) = value {
            doc[key] = toml_edit::value(value.as_str());
        }
    }

    if let Some(exclude) = &options.image_exclude {
        doc[params::IMAGE_EXCLUDE] = toml_edit::value(string_array(exclude));
    }
    if let Some(scan) = options.scan_on_push {
        doc[params::SCAN_ON_PUSH] = toml_edit::value(scan);
    }

    let mut security = Table::new();
    security.decor_mut().set_prefix(SECURITY_COMMENT);
    let prefix = format!("{}.", params::SECURITY);
    if let Some(source) = &options.security.ingress_source {
        security[short_key(params::INGRESS_SOURCE, &prefix)] = toml_edit::value(source.as_str());
    }
    if let Some(resources) = &options.security.model_invocation_resources {
        security[short_key(params::MODEL_INVOCATION_RESOURCES, &prefix)] =
            toml_edit::value(string_array(resources));
    }
    if let Some(read_only) = options.security.read_only_access {
        security[short_key(params::READ_ONLY_ACCESS, &prefix)] = toml_edit::value(read_only);
    }
    doc[params::SECURITY] = Item::Table(security);

    format!("{HEADER}\n{doc}")
}

fn short_key<'a>(qualified: &'a str, prefix: &str) -> &'a str {
    qualified.strip_prefix(prefix).unwrap_or(qualified)
}

fn string_array(values: &[String]) -> Array {
    let mut array = Array::new();
    for value in values {
        array.push(value.as_str());
    }
    array
}
