//! Resource descriptions (Functional Core - pure data).
//!
//! Each entity is a configuration record constructed once and handed to a
//! provisioning engine. References to other resources are always explicit
//! ([`AttrRef`] or [`ResourceId`]), which is what lets the graph derive its
//! dependency edges.

use serde::Serialize;

use crate::config::Ipv4Cidr;
use crate::graph::{AttrRef, ResourceId, ResourceKind};

/// An isolated virtual network with public subnets only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub cidr: Ipv4Cidr,
    pub max_availability_zones: u8,
    pub nat_gateways: u8,
    pub subnets: Vec<Subnet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub name: String,
    pub cidr: Ipv4Cidr,
    pub subnet_type: SubnetType,
    pub availability_zone_index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetType {
    Public,
}

/// Versioned container image storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepository {
    pub name: String,
    pub removal_policy: RemovalPolicy,
    pub scan_on_push: bool,
    /// Delete stored images together with the repository.
    pub empty_on_delete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Destroy,
    Retain,
}

/// Builds an image from a source directory and pushes it to a repository.
///
/// Performed by an image-build service, not by the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuild {
    pub directory: String,
    pub exclude: Vec<String>,
    pub platform: String,
    pub repository: AttrRef,
    pub tag: String,
}

/// Logical grouping for container workloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub network: AttrRef,
}

/// Identity assumed by a principal plus its permission grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRole {
    pub principal: String,
    pub managed_policies: Vec<String>,
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<String>) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }

    /// True when the statement applies to every resource.
    pub fn is_wildcard(&self) -> bool {
        self.resources.iter().any(|r| r == "*")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Resource requirements and bindings of a single runnable container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub cpu_units: u32,
    pub memory_mib: u32,
    pub task_role: AttrRef,
    pub execution_role: AttrRef,
    pub container: ContainerDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,
    pub image: ImageReference,
    pub port_mappings: Vec<PortMapping>,
    pub environment: Vec<EnvironmentVariable>,
    pub logging: LogConfiguration,
}

/// `repository:tag`, produced by an image build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    pub repository: AttrRef,
    pub tag: String,
    pub build: ResourceId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfiguration {
    pub driver: LogDriver,
    pub stream_prefix: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDriver {
    Awslogs,
}

/// A single network allow-list entry, plus the group it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    pub network: AttrRef,
    pub description: String,
    pub direction: Direction,
    pub protocol: Protocol,
    pub port: u16,
    pub source: Ipv4Cidr,
    pub allow_all_outbound: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
}

/// Desired-count supervision of task instances on a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub cluster: AttrRef,
    pub task: AttrRef,
    pub desired_count: u32,
    pub subnets: AttrRef,
    pub security_group: AttrRef,
    pub assign_public_ip: bool,
    /// Container the service exposes to load balancers.
    pub container_name: String,
    pub container_port: u16,
}

/// Public entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub network: AttrRef,
    pub subnets: AttrRef,
    pub internet_facing: bool,
    /// Port the load balancer accepts public traffic on.
    pub ingress_port: u16,
    pub ingress_source: Ipv4Cidr,
}

/// Instances a listener forwards to, with their health-check policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroup {
    pub network: AttrRef,
    pub port: u16,
    pub protocol: ApplicationProtocol,
    pub target_type: TargetType,
    pub targets: Vec<ServiceTarget>,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTarget {
    pub service: ResourceId,
    pub container_name: String,
    pub container_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub path: String,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationProtocol {
    Http,
    Https,
}

impl ApplicationProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }

    /// URL scheme clients use to reach a listener.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Ip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub load_balancer: AttrRef,
    pub port: u16,
    pub protocol: ApplicationProtocol,
    pub target_group: AttrRef,
}

/// A value exposed after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    pub name: String,
    pub description: String,
    pub value: Vec<ValueFragment>,
}

impl Output {
    /// Renders the value expression, e.g. `http://${LoadBalancer.dnsName}`.
    pub fn expression(&self) -> String {
        self.value
            .iter()
            .map(|fragment| match fragment {
                ValueFragment::Literal(text) => text.clone(),
                ValueFragment::Ref(reference) => format!("${{{reference}}}"),
            })
            .collect()
    }

    /// Returns the reference when the value is exactly one attribute.
    pub fn single_reference(&self) -> Option<&AttrRef> {
        match self.value.as_slice() {
            [ValueFragment::Ref(reference)] => Some(reference),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueFragment {
    Literal(String),
    Ref(AttrRef),
}

/// Any resource description a graph node can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    Network(Network),
    ImageRepository(ImageRepository),
    ImageBuild(ImageBuild),
    Cluster(Cluster),
    AccessRole(AccessRole),
    TaskSpec(TaskSpec),
    SecurityRule(SecurityRule),
    Service(Service),
    LoadBalancer(LoadBalancer),
    TargetGroup(TargetGroup),
    Listener(Listener),
    Output(Output),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network(_) => ResourceKind::Network,
            Self::ImageRepository(_) => ResourceKind::ImageRepository,
            Self::ImageBuild(_) => ResourceKind::ImageBuild,
            Self::Cluster(_) => ResourceKind::Cluster,
            Self::AccessRole(_) => ResourceKind::AccessRole,
            Self::TaskSpec(_) => ResourceKind::TaskSpec,
            Self::SecurityRule(_) => ResourceKind::SecurityRule,
            Self::Service(_) => ResourceKind::Service,
            Self::LoadBalancer(_) => ResourceKind::LoadBalancer,
            Self::TargetGroup(_) => ResourceKind::TargetGroup,
            Self::Listener(_) => ResourceKind::Listener,
            Self::Output(_) => ResourceKind::Output,
        }
    }

    /// Every node this resource reads from, in declaration order, deduplicated.
    pub fn references(&self) -> Vec<ResourceId> {
        let refs: Vec<&ResourceId> = match self {
            Self::Network(_) | Self::ImageRepository(_) | Self::AccessRole(_) => Vec::new(),
            Self::ImageBuild(build) => vec![&build.repository.resource],
            Self::Cluster(cluster) => vec![&cluster.network.resource],
            Self::TaskSpec(task) => vec![
                &task.task_role.resource,
                &task.execution_role.resource,
                &task.container.image.repository.resource,
                &task.container.image.build,
            ],
            Self::SecurityRule(rule) => vec![&rule.network.resource],
            Self::Service(service) => vec![
                &service.cluster.resource,
                &service.task.resource,
                &service.subnets.resource,
                &service.security_group.resource,
            ],
            Self::LoadBalancer(lb) => vec![&lb.network.resource, &lb.subnets.resource],
            Self::TargetGroup(group) => std::iter::once(&group.network.resource)
                .chain(group.targets.iter().map(|t| &t.service))
                .collect(),
            Self::Listener(listener) => vec![
                &listener.load_balancer.resource,
                &listener.target_group.resource,
            ],
            Self::Output(output) => output
                .value
                .iter()
                .filter_map(|fragment| match fragment {
                    ValueFragment::Ref(reference) => Some(&reference.resource),
                    ValueFragment::Literal(_) => None,
                })
                .collect(),
        };

        let mut unique: Vec<ResourceId> = Vec::with_capacity(refs.len());
        for id in refs {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }
        unique
    }
}
