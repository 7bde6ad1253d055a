//! Validated configuration types.

use serde::Serialize;

use super::cidr::Ipv4Cidr;
use super::environment::Environment;

/// A fully validated stack configuration.
///
/// Only obtainable through [`StackConfig::new`], so every value here
/// satisfies the range and ordering rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    pub stack_name: String,
    pub environment: Environment,
    pub network: NetworkConfig,
    pub repository: RepositoryConfig,
    pub image: ImageConfig,
    pub task: TaskConfig,
    pub service: ServiceConfig,
    pub load_balancer: LoadBalancerConfig,
    pub security: SecurityProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub cidr: Ipv4Cidr,
    pub max_availability_zones: u8,
    pub subnet_cidr_mask: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    pub name: String,
    pub scan_on_push: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub directory: String,
    pub exclude: Vec<String>,
    pub platform: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    pub cpu_units: u32,
    pub memory_mib: u32,
    pub container_port: u16,
    pub log_stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub desired_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    pub listener_port: u16,
    pub health_check: HealthCheckConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    pub path: String,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
}

/// Security parameters that decide how far the workload is exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProfile {
    /// Source range allowed to reach the container port.
    pub ingress_source: Ipv4Cidr,
    /// Resources the task role may invoke models on.
    pub model_invocation_resources: Vec<String>,
    /// Attach the account-wide read-only managed policy to the task role.
    pub read_only_access: bool,
}
