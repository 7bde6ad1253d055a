//! The resource DAG.
//!
//! Nodes can only reference nodes added before them, so insertion order is
//! always a valid topological order. The explicit ordering queries are still
//! computed from the edges so that subgraphs and derived graphs are handled
//! uniformly.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Result, TopologyError};
use crate::resources::{Resource, ValueFragment};

use super::types::{AttrRef, Node, ResourceId, ResourceKind};

/// A typed, acyclic graph of resource descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGraph {
    nodes: Vec<Node>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, deriving its dependencies from the references it carries.
    ///
    /// Fails when a reference names a node that is not in the graph yet, or
    /// when `id` is already taken.
    pub fn add(&mut self, id: impl Into<ResourceId>, resource: Resource) -> Result<&Node> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(TopologyError::DuplicateResource(id));
        }

        let depends_on = resource.references();
        if let Some(missing) = depends_on.iter().find(|dep| !self.index.contains_key(*dep)) {
            return Err(TopologyError::ResourceReference {
                from: id,
                to: missing.clone(),
            });
        }

        let position = self.nodes.len();
        self.index.insert(id.clone(), position);
        self.nodes.push(Node {
            id,
            kind: resource.kind(),
            depends_on,
            attributes: resource,
        });
        Ok(&self.nodes[position])
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Nodes in construction order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Ids of every node of the given kind, in construction order.
    pub fn ids_of_kind(&self, kind: ResourceKind) -> Vec<&ResourceId> {
        self.nodes
            .iter()
            .filter(|node| node.kind == kind)
            .map(|node| &node.id)
            .collect()
    }

    /// Every `(dependent, dependency)` pair.
    pub fn edges(&self) -> Vec<(&ResourceId, &ResourceId)> {
        self.nodes
            .iter()
            .flat_map(|node| node.depends_on.iter().map(move |dep| (&node.id, dep)))
            .collect()
    }

    /// Direct dependencies of a node.
    pub fn dependencies(&self, id: &ResourceId) -> Result<&[ResourceId]> {
        self.get(id)
            .map(|node| node.depends_on.as_slice())
            .ok_or_else(|| TopologyError::UnknownResource(id.clone()))
    }

    /// True when `from` reaches `to` through one or more edges.
    pub fn depends_on(&self, from: &ResourceId, to: &ResourceId) -> Result<bool> {
        if !self.contains(to) {
            return Err(TopologyError::UnknownResource(to.clone()));
        }
        Ok(self.ancestors(from)?.contains(to))
    }

    /// True when neither node reaches the other.
    pub fn independent(&self, a: &ResourceId, b: &ResourceId) -> Result<bool> {
        Ok(a != b && !self.depends_on(a, b)? && !self.depends_on(b, a)?)
    }

    /// Transitive dependencies of a node, in construction order.
    pub fn ancestors(&self, id: &ResourceId) -> Result<Vec<ResourceId>> {
        let mut seen: HashSet<&ResourceId> = HashSet::new();
        let mut stack: Vec<&ResourceId> = self.dependencies(id)?.iter().collect();

        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                stack.extend(self.dependencies(current)?.iter());
            }
        }

        Ok(self
            .nodes
            .iter()
            .filter(|node| seen.contains(&node.id))
            .map(|node| node.id.clone())
            .collect())
    }

    /// Kahn's algorithm; ties are broken by construction order.
    pub fn topological_order(&self) -> Result<Vec<ResourceId>> {
        Ok(self.waves()?.into_iter().flatten().collect())
    }

    /// Groups nodes so that every dependency of a wave lives in an earlier
    /// wave. Nodes within a wave can be reconciled concurrently.
    pub fn waves(&self) -> Result<Vec<Vec<ResourceId>>> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (position, node) in self.nodes.iter().enumerate() {
            for dep in &node.depends_on {
                let dep_position = self
                    .index
                    .get(dep)
                    .ok_or_else(|| TopologyError::UnknownResource(dep.clone()))?;
                dependents[*dep_position].push(position);
            }
        }

        let mut ready: VecDeque<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(position, _)| position)
            .collect();

        let mut waves = Vec::new();
        let mut visited = 0;
        while !ready.is_empty() {
            let mut wave: Vec<usize> = ready.drain(..).collect();
            wave.sort_unstable();
            visited += wave.len();

            let mut next = Vec::new();
            for &position in &wave {
                for &dependent in &dependents[position] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            ready.extend(next);
            waves.push(wave.into_iter().map(|p| self.nodes[p].id.clone()).collect());
        }

        if visited != self.nodes.len() {
            let stuck = remaining
                .iter()
                .position(|&count| count > 0)
                .map(|p| self.nodes[p].id.clone())
                .unwrap_or_else(|| ResourceId::new("?"));
            return Err(TopologyError::Cycle(stuck));
        }

        Ok(waves)
    }

    /// The nodes in `roots` plus everything they depend on, in construction
    /// order.
    pub fn subgraph<'a, I>(&self, roots: I) -> Result<ResourceGraph>
    where
        I: IntoIterator<Item = &'a ResourceId>,
    {
        let mut keep: HashSet<ResourceId> = HashSet::new();
        for root in roots {
            if !self.contains(root) {
                return Err(TopologyError::UnknownResource(root.clone()));
            }
            keep.extend(self.ancestors(root)?);
            keep.insert(root.clone());
        }

        let mut graph = ResourceGraph::new();
        for node in self.nodes.iter().filter(|node| keep.contains(&node.id)) {
            graph.add(node.id.clone(), node.attributes.clone())?;
        }
        Ok(graph)
    }

    /// The output node whose value is exactly the given attribute.
    pub fn output_exposing(&self, reference: &AttrRef) -> Option<&Node> {
        self.nodes.iter().find(|node| match &node.attributes {
            Resource::Output(output) => matches!(
                output.value.as_slice(),
                [ValueFragment::Ref(r)] if r == reference
            ),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Ipv4Cidr;
    use crate::graph::Attribute;
    use crate::resources::{Cluster, ImageRepository, Network, Output, RemovalPolicy};

    fn network() -> Resource {
        Resource::Network(Network {
            cidr: "10.0.0.0/16".parse::<Ipv4Cidr>().unwrap(),
            max_availability_zones: 2,
            nat_gateways: 0,
            subnets: Vec::new(),
        })
    }

    fn repository() -> Resource {
        Resource::ImageRepository(ImageRepository {
            name: "agent".into(),
            removal_policy: RemovalPolicy::Destroy,
            scan_on_push: true,
            empty_on_delete: true,
        })
    }

    fn cluster(network: &str) -> Resource {
        Resource::Cluster(Cluster {
            network: AttrRef::new(&ResourceId::new(network), Attribute::Id),
        })
    }

    fn output(name: &str, resource: &str, attribute: Attribute) -> Resource {
        Resource::Output(Output {
            name: name.into(),
            description: String::new(),
            value: vec![ValueFragment::Ref(AttrRef::new(
                &ResourceId::new(resource),
                attribute,
            ))],
        })
    }

    fn sample() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph.add("Network", network()).unwrap();
        graph.add("Repository", repository()).unwrap();
        graph.add("Cluster", cluster("Network")).unwrap();
        graph
            .add("RepositoryUri", output("RepositoryUri", "Repository", Attribute::Uri))
            .unwrap();
        graph
    }

    fn id(name: &str) -> ResourceId {
        ResourceId::new(name)
    }

    #[test]
    fn test_add_derives_dependencies() {
        let graph = sample();
        assert_eq!(graph.dependencies(&id("Cluster")).unwrap(), &[id("Network")]);
        assert!(graph.dependencies(&id("Network")).unwrap().is_empty());
        assert_eq!(graph.get(&id("Cluster")).unwrap().kind, ResourceKind::Cluster);
    }

    #[test]
    fn test_add_rejects_forward_reference() {
        let mut graph = ResourceGraph::new();
        let result = graph.add("Cluster", cluster("Network"));
        assert_eq!(
            result.unwrap_err(),
            TopologyError::ResourceReference {
                from: id("Cluster"),
                to: id("Network"),
            }
        );
        assert!(graph.is_empty());
    }

    #[test]
    fn test_add_rejects_duplicate() {
        let mut graph = sample();
        let result = graph.add("Network", network());
        assert_eq!(result.unwrap_err(), TopologyError::DuplicateResource(id("Network")));
    }

    #[test]
    fn test_edges() {
        let graph = sample();
        assert_eq!(
            graph.edges(),
            vec![
                (&id("Cluster"), &id("Network")),
                (&id("RepositoryUri"), &id("Repository")),
            ]
        );
    }

    #[test]
    fn test_waves_group_independent_nodes() {
        let graph = sample();
        assert_eq!(
            graph.waves().unwrap(),
            vec![
                vec![id("Network"), id("Repository")],
                vec![id("Cluster"), id("RepositoryUri")],
            ]
        );
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![id("Network"), id("Repository"), id("Cluster"), id("RepositoryUri")]
        );
    }

    #[test]
    fn test_independent_and_depends_on() {
        let graph = sample();
        assert!(graph.depends_on(&id("Cluster"), &id("Network")).unwrap());
        assert!(!graph.depends_on(&id("Network"), &id("Cluster")).unwrap());
        assert!(graph.independent(&id("Cluster"), &id("Repository")).unwrap());
        assert!(!graph.independent(&id("Cluster"), &id("Network")).unwrap());
        assert!(!graph.independent(&id("Cluster"), &id("Cluster")).unwrap());
    }

    #[test]
    fn test_unknown_resource() {
        let graph = sample();
        assert_eq!(
            graph.dependencies(&id("Missing")).unwrap_err(),
            TopologyError::UnknownResource(id("Missing"))
        );
        assert!(graph.depends_on(&id("Cluster"), &id("Missing")).is_err());
    }

    #[test]
    fn test_subgraph_is_closed_under_dependencies() {
        let graph = sample();
        let sub = graph.subgraph([&id("Cluster")]).unwrap();
        let ids: Vec<&str> = sub.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["Network", "Cluster"]);
    }

    #[test]
    fn test_output_exposing() {
        let graph = sample();
        let reference = AttrRef::new(&id("Repository"), Attribute::Uri);
        assert_eq!(graph.output_exposing(&reference).unwrap().id, id("RepositoryUri"));
        assert!(graph
            .output_exposing(&AttrRef::new(&id("Repository"), Attribute::Arn))
            .is_none());
    }
}
