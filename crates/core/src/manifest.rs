//! Engine-neutral serialised form of a resource graph.

use serde::Serialize;

use crate::config::{Environment, StackConfig};
use crate::error::Result;
use crate::graph::{Node, ResourceGraph, ResourceId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest<'a> {
    pub stack_name: &'a str,
    pub environment: &'a Environment,
    /// Nodes in construction order.
    pub nodes: &'a [Node],
    pub edges: Vec<Edge<'a>>,
    pub waves: Vec<Vec<ResourceId>>,
}

/// `from` depends on `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge<'a> {
    pub from: &'a ResourceId,
    pub to: &'a ResourceId,
}

impl<'a> Manifest<'a> {
    pub fn from_graph(config: &'a StackConfig, graph: &'a ResourceGraph) -> Result<Self> {
        Ok(Self {
            stack_name: &config.stack_name,
            environment: &config.environment,
            nodes: graph.nodes(),
            edges: graph
                .edges()
                .into_iter()
                .map(|(from, to)| Edge { from, to })
                .collect(),
            waves: graph.waves()?,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackOptions;
    use crate::topology::TopologyBuilder;

    #[test]
    fn test_manifest_shape() {
        let config = StackConfig::new(&StackOptions::reference(), Environment::default()).unwrap();
        let graph = TopologyBuilder::new(config.clone()).build().unwrap();
        let manifest = Manifest::from_graph(&config, &graph).unwrap();
        let value = serde_json::to_value(&manifest).unwrap();

        assert_eq!(value["stackName"], "CloudEngineerAgentStack");
        assert_eq!(value["environment"]["region"], "us-east-1");
        assert_eq!(value["nodes"].as_array().unwrap().len(), graph.len());

        let network = &value["nodes"][0];
        assert_eq!(network["id"], "Network");
        assert_eq!(network["kind"], "Network");
        assert_eq!(network["attributes"]["natGateways"], 0);
        assert_eq!(network["dependsOn"].as_array().unwrap().len(), 0);

        let cluster = value["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["id"] == "Cluster")
            .unwrap();
        assert_eq!(cluster["dependsOn"][0], "Network");
        assert_eq!(cluster["attributes"]["network"]["resource"], "Network");
        assert_eq!(cluster["attributes"]["network"]["attribute"], "id");

        assert!(value["edges"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!({ "from": "Cluster", "to": "Network" })));
        assert_eq!(value["waves"][0][0], "Network");
    }

    #[test]
    fn test_to_json_is_pretty() {
        let config = StackConfig::new(&StackOptions::reference(), Environment::default()).unwrap();
        let graph = TopologyBuilder::new(config.clone()).build().unwrap();
        let json = Manifest::from_graph(&config, &graph).unwrap().to_json().unwrap();
        assert!(json.starts_with("{\n"));
    }
}
