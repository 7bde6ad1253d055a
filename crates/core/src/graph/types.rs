use std::fmt;

use serde::Serialize;

use crate::resources::Resource;

/// Identifier of a node in a resource graph. Also used as the engine's
/// logical resource name, so builders keep it alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Entity type of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Network,
    ImageRepository,
    ImageBuild,
    Cluster,
    AccessRole,
    TaskSpec,
    SecurityRule,
    Service,
    LoadBalancer,
    TargetGroup,
    Listener,
    Output,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::ImageRepository => "ImageRepository",
            Self::ImageBuild => "ImageBuild",
            Self::Cluster => "Cluster",
            Self::AccessRole => "AccessRole",
            Self::TaskSpec => "TaskSpec",
            Self::SecurityRule => "SecurityRule",
            Self::Service => "Service",
            Self::LoadBalancer => "LoadBalancer",
            Self::TargetGroup => "TargetGroup",
            Self::Listener => "Listener",
            Self::Output => "Output",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute a resource exposes once it has been reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    /// Engine identifier (VPC id, cluster name, ...).
    Id,
    Arn,
    Name,
    /// Registry URI of an image repository.
    Uri,
    /// Subnet identifiers of a network.
    SubnetIds,
    /// Security group identifier of a security rule.
    GroupId,
    /// Public DNS name of a load balancer.
    DnsName,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Arn => "arn",
            Self::Name => "name",
            Self::Uri => "uri",
            Self::SubnetIds => "subnetIds",
            Self::GroupId => "groupId",
            Self::DnsName => "dnsName",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to an attribute of another node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AttrRef {
    pub resource: ResourceId,
    pub attribute: Attribute,
}

impl AttrRef {
    pub fn new(resource: &ResourceId, attribute: Attribute) -> Self {
        Self {
            resource: resource.clone(),
            attribute,
        }
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// A resource description plus its hard dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub depends_on: Vec<ResourceId>,
    pub attributes: Resource,
}

impl Node {
    pub fn resource(&self) -> &Resource {
        &self.attributes
    }
}
