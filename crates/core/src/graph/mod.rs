mod resource_graph;
mod types;

pub use resource_graph::ResourceGraph;
pub use types::{AttrRef, Attribute, Node, ResourceId, ResourceKind};
