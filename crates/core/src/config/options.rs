//! The configuration record (Functional Core - pure data).
//!
//! Every option is optional here; defaults and validation are applied when
//! the record is turned into a [`super::StackConfig`]. Integers are kept as
//! `i64` so that out-of-range input survives long enough to be reported
//! with the parameter name.

/// Canonical option names, used as configuration-file keys and in errors.
pub mod params {
    pub const STACK_NAME: &str = "stackName";
    pub const MAX_AVAILABILITY_ZONES: &str = "maxAvailabilityZones";
    pub const VPC_CIDR: &str = "vpcCidr";
    pub const SUBNET_CIDR_MASK: &str = "subnetCidrMask";
    pub const REPOSITORY_NAME: &str = "repositoryName";
    pub const SCAN_ON_PUSH: &str = "scanOnPush";
    pub const IMAGE_DIRECTORY: &str = "imageDirectory";
    pub const IMAGE_EXCLUDE: &str = "imageExclude";
    pub const IMAGE_PLATFORM: &str = "imagePlatform";
    pub const IMAGE_TAG: &str = "imageTag";
    pub const CPU_UNITS: &str = "cpuUnits";
    pub const MEMORY_MIB: &str = "memoryMiB";
    pub const CONTAINER_PORT: &str = "containerPort";
    pub const LISTENER_PORT: &str = "listenerPort";
    pub const DESIRED_COUNT: &str = "desiredCount";
    pub const LOG_STREAM_PREFIX: &str = "logStreamPrefix";
    pub const HEALTH_CHECK_PATH: &str = "healthCheckPath";
    pub const HEALTH_CHECK_INTERVAL_SECONDS: &str = "healthCheckIntervalSeconds";
    pub const HEALTH_CHECK_TIMEOUT_SECONDS: &str = "healthCheckTimeoutSeconds";

    /// Table holding the security parameters.
    pub const SECURITY: &str = "security";
    pub const INGRESS_SOURCE: &str = "security.ingressSource";
    pub const MODEL_INVOCATION_RESOURCES: &str = "security.modelInvocationResources";
    pub const READ_ONLY_ACCESS: &str = "security.readOnlyAccess";
}

pub const DEFAULT_STACK_NAME: &str = "CloudEngineerAgentStack";
pub const DEFAULT_MAX_AVAILABILITY_ZONES: i64 = 2;
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";
pub const DEFAULT_SUBNET_CIDR_MASK: i64 = 24;
pub const DEFAULT_IMAGE_DIRECTORY: &str = ".";
pub const DEFAULT_IMAGE_EXCLUDE: [&str; 4] = ["cdk.out", "target", "node_modules", ".git"];
pub const DEFAULT_IMAGE_PLATFORM: &str = "linux/amd64";
pub const DEFAULT_IMAGE_TAG: &str = "latest";
pub const DEFAULT_CPU_UNITS: i64 = 1024;
pub const DEFAULT_MEMORY_MIB: i64 = 2048;
pub const DEFAULT_CONTAINER_PORT: i64 = 8501;
pub const DEFAULT_LISTENER_PORT: i64 = 80;
pub const DEFAULT_DESIRED_COUNT: i64 = 1;
pub const DEFAULT_LOG_STREAM_PREFIX: &str = "cloud-engineer-agent";
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/";
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS: i64 = 60;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECONDS: i64 = 5;

/// Repository name of the reference deployment.
pub const REFERENCE_REPOSITORY_NAME: &str = "cloud-engineer-agent";
/// Ingress source of the reference deployment (the whole internet).
pub const REFERENCE_INGRESS_SOURCE: &str = "0.0.0.0/0";
/// Model-invocation scope of the reference deployment.
pub const REFERENCE_MODEL_INVOCATION_RESOURCE: &str = "*";

/// Security parameters. Unset values resolve to the scoped defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityOptions {
    pub ingress_source: Option<String>,
    pub model_invocation_resources: Option<Vec<String>>,
    pub read_only_access: Option<bool>,
}

/// The configuration record accepted by the topology builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackOptions {
    pub stack_name: Option<String>,
    pub max_availability_zones: Option<i64>,
    pub vpc_cidr: Option<String>,
    pub subnet_cidr_mask: Option<i64>,
    pub repository_name: Option<String>,
    pub scan_on_push: Option<bool>,
    pub image_directory: Option<String>,
    pub image_exclude: Option<Vec<String>>,
    pub image_platform: Option<String>,
    pub image_tag: Option<String>,
    pub cpu_units: Option<i64>,
    pub memory_mib: Option<i64>,
    pub container_port: Option<i64>,
    pub listener_port: Option<i64>,
    pub desired_count: Option<i64>,
    pub log_stream_prefix: Option<String>,
    pub health_check_path: Option<String>,
    pub health_check_interval_seconds: Option<i64>,
    pub health_check_timeout_seconds: Option<i64>,
    pub security: SecurityOptions,
}

impl StackOptions {
    /// The reference deployment, with every option spelled out.
    ///
    /// Security parameters keep the scoped defaults; layer
    /// [`StackOptions::reference_security`] on top to reproduce the
    /// reference's permissive settings.
    pub fn reference() -> Self {
        Self {
            stack_name: Some(DEFAULT_STACK_NAME.to_string()),
            max_availability_zones: Some(DEFAULT_MAX_AVAILABILITY_ZONES),
            vpc_cidr: Some(DEFAULT_VPC_CIDR.to_string()),
            subnet_cidr_mask: Some(DEFAULT_SUBNET_CIDR_MASK),
            repository_name: Some(REFERENCE_REPOSITORY_NAME.to_string()),
            scan_on_push: Some(true),
            image_directory: Some(DEFAULT_IMAGE_DIRECTORY.to_string()),
            image_exclude: Some(DEFAULT_IMAGE_EXCLUDE.iter().map(|s| s.to_string()).collect()),
            image_platform: Some(DEFAULT_IMAGE_PLATFORM.to_string()),
            image_tag: Some(DEFAULT_IMAGE_TAG.to_string()),
            cpu_units: Some(DEFAULT_CPU_UNITS),
            memory_mib: Some(DEFAULT_MEMORY_MIB),
            container_port: Some(DEFAULT_CONTAINER_PORT),
            listener_port: Some(DEFAULT_LISTENER_PORT),
            desired_count: Some(DEFAULT_DESIRED_COUNT),
            log_stream_prefix: Some(DEFAULT_LOG_STREAM_PREFIX.to_string()),
            health_check_path: Some(DEFAULT_HEALTH_CHECK_PATH.to_string()),
            health_check_interval_seconds: Some(DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS),
            health_check_timeout_seconds: Some(DEFAULT_HEALTH_CHECK_TIMEOUT_SECONDS),
            security: SecurityOptions::default(),
        }
    }

    /// Only the reference deployment's security parameters: open ingress,
    /// wildcard model invocation, account-wide read-only access.
    pub fn reference_security() -> Self {
        Self {
            security: SecurityOptions {
                ingress_source: Some(REFERENCE_INGRESS_SOURCE.to_string()),
                model_invocation_resources: Some(vec![
                    REFERENCE_MODEL_INVOCATION_RESOURCE.to_string(),
                ]),
                read_only_access: Some(true),
            },
            ..Self::default()
        }
    }

    /// Sets the repository name.
    pub fn with_repository_name(mut self, name: &str) -> Self {
        self.repository_name = Some(name.to_string());
        self
    }

    /// Layers `overrides` on top of `self`; values set in `overrides` win.
    pub fn merge(self, overrides: StackOptions) -> Self {
        Self {
            stack_name: overrides.stack_name.or(self.stack_name),
            max_availability_zones: overrides
                .max_availability_zones
                .or(self.max_availability_zones),
            vpc_cidr: overrides.vpc_cidr.or(self.vpc_cidr),
            subnet_cidr_mask: overrides.subnet_cidr_mask.or(self.subnet_cidr_mask),
            repository_name: overrides.repository_name.or(self.repository_name),
            scan_on_push: overrides.scan_on_push.or(self.scan_on_push),
            image_directory: overrides.image_directory.or(self.image_directory),
            image_exclude: overrides.image_exclude.or(self.image_exclude),
            image_platform: overrides.image_platform.or(self.image_platform),
            image_tag: overrides.image_tag.or(self.image_tag),
            cpu_units: overrides.cpu_units.or(self.cpu_units),
            memory_mib: overrides.memory_mib.or(self.memory_mib),
            container_port: overrides.container_port.or(self.container_port),
            listener_port: overrides.listener_port.or(self.listener_port),
            desired_count: overrides.desired_count.or(self.desired_count),
            log_stream_prefix: overrides.log_stream_prefix.or(self.log_stream_prefix),
            health_check_path: overrides.health_check_path.or(self.health_check_path),
            health_check_interval_seconds: overrides
                .health_check_interval_seconds
                .or(self.health_check_interval_seconds),
            health_check_timeout_seconds: overrides
                .health_check_timeout_seconds
                .or(self.health_check_timeout_seconds),
            security: SecurityOptions {
                ingress_source: overrides
                    .security
                    .ingress_source
                    .or(self.security.ingress_source),
                model_invocation_resources: overrides
                    .security
                    .model_invocation_resources
                    .or(self.security.model_invocation_resources),
                read_only_access: overrides
                    .security
                    .read_only_access
                    .or(self.security.read_only_access),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_is_empty() {
        let options = StackOptions::default();
        assert_eq!(options.repository_name, None);
        assert_eq!(options.container_port, None);
    }

    #[test]
    fn test_reference_values() {
        let options = StackOptions::reference();
        assert_eq!(options.repository_name.as_deref(), Some("cloud-engineer-agent"));
        assert_eq!(options.max_availability_zones, Some(2));
        assert_eq!(options.container_port, Some(8501));
        assert_eq!(options.listener_port, Some(80));
        assert_eq!(options.cpu_units, Some(1024));
        assert_eq!(options.memory_mib, Some(2048));
        assert_eq!(options.security, SecurityOptions::default());
    }

    #[test]
    fn test_merge_overrides_win() {
        let base = StackOptions::reference();
        let overrides = StackOptions {
            container_port: Some(9000),
            ..StackOptions::default()
        };

        let merged = base.merge(overrides);

        assert_eq!(merged.container_port, Some(9000));
        assert_eq!(merged.listener_port, Some(80));
        assert_eq!(merged.repository_name.as_deref(), Some("cloud-engineer-agent"));
    }

    #[test]
    fn test_merge_reference_security() {
        let merged = StackOptions::reference().merge(StackOptions::reference_security());

        assert_eq!(merged.security.ingress_source.as_deref(), Some("0.0.0.0/0"));
        assert_eq!(
            merged.security.model_invocation_resources,
            Some(vec!["*".to_string()])
        );
        assert_eq!(merged.container_port, Some(8501));
    }

    #[test]
    fn test_with_repository_name() {
        let options = StackOptions::default().with_repository_name("my-agent");
        assert_eq!(options.repository_name.as_deref(), Some("my-agent"));
    }
}
