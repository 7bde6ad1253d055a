//! Pure functions for calculating deploy and destroy plans (Functional Core).
//!
//! Image builds are performed outside the provisioning engine, so a deploy
//! alternates cumulative provisioning stages with image publication: each
//! build runs once its repository (and the output exposing it) exists, and
//! before anything that consumes the image is provisioned.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::ScheduleError;
use crate::graph::{AttrRef, Node, ResourceGraph, ResourceId, ResourceKind};
use crate::resources::Resource;

/// A node scheduled for provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedResource {
    pub id: ResourceId,
    pub kind: ResourceKind,
}

/// One step of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum DeployStep {
    /// Apply a stage: every resource in `resources` must exist afterwards.
    #[serde(rename_all = "camelCase")]
    Provision {
        stage: usize,
        /// Resources first introduced by this stage.
        added: Vec<PlannedResource>,
        /// Every resource of this stage, earlier stages included.
        resources: Vec<ResourceId>,
    },
    /// Build an image and push it to a provisioned repository.
    #[serde(rename_all = "camelCase")]
    PublishImage {
        build: ResourceId,
        repository: AttrRef,
        /// Stack output holding the repository location.
        repository_output: String,
        directory: String,
        exclude: Vec<String>,
        platform: String,
        tag: String,
    },
}

/// Ordered steps of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployPlan {
    pub steps: Vec<DeployStep>,
}

impl DeployPlan {
    /// Number of provisioning stages.
    pub fn stage_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, DeployStep::Provision { .. }))
            .count()
    }
}

/// Plan for destroying a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum DestroyPlan {
    /// Stack exists and will be deleted, dependents first.
    #[serde(rename_all = "camelCase")]
    DeleteStack {
        stack_name: String,
        resources: Vec<PlannedResource>,
    },
    /// Stack doesn't exist, nothing to do.
    #[serde(rename_all = "camelCase")]
    AlreadyGone { stack_name: String },
}

/// Pure function: Split the graph into provisioning stages and image publications.
pub fn calculate_deploy_plan(graph: &ResourceGraph) -> Result<DeployPlan, ScheduleError> {
    let order = graph.topological_order()?;
    let ancestors: HashMap<&ResourceId, HashSet<ResourceId>> = graph
        .nodes()
        .iter()
        .map(|node| -> Result<_, ScheduleError> {
            Ok((&node.id, graph.ancestors(&node.id)?.into_iter().collect()))
        })
        .collect::<Result<_, _>>()?;

    let builds: Vec<&Node> = order
        .iter()
        .filter_map(|id| graph.get(id))
        .filter(|node| node.kind == ResourceKind::ImageBuild)
        .collect();

    let mut pending: HashSet<&ResourceId> = builds.iter().map(|node| &node.id).collect();
    let mut provisioned: Vec<ResourceId> = Vec::new();
    let mut steps = Vec::new();
    let mut stage = 0;

    let blocked = |id: &ResourceId, pending: &HashSet<&ResourceId>| {
        ancestors
            .get(id)
            .is_some_and(|deps| deps.iter().any(|dep| pending.contains(dep)))
    };

    for build in builds {
        let Resource::ImageBuild(spec) = build.resource() else {
            continue;
        };

        let output = graph
            .output_exposing(&spec.repository)
            .filter(|output| !blocked(&output.id, &pending))
            .ok_or_else(|| ScheduleError::UnexposedRepository {
                build: build.id.clone(),
                repository: spec.repository.clone(),
            })?;
        let repository_output = match output.resource() {
            Resource::Output(o) => o.name.clone(),
            _ => output.id.to_string(),
        };

        let added: Vec<PlannedResource> = graph
            .nodes()
            .iter()
            .filter(|node| node.kind != ResourceKind::ImageBuild)
            .filter(|node| !provisioned.contains(&node.id))
            .filter(|node| !blocked(&node.id, &pending))
            .map(|node| PlannedResource {
                id: node.id.clone(),
                kind: node.kind,
            })
            .collect();

        if !added.is_empty() {
            stage += 1;
            provisioned.extend(added.iter().map(|r| r.id.clone()));
            steps.push(DeployStep::Provision {
                stage,
                added,
                resources: in_construction_order(graph, &provisioned),
            });
        }

        steps.push(DeployStep::PublishImage {
            build: build.id.clone(),
            repository: spec.repository.clone(),
            repository_output,
            directory: spec.directory.clone(),
            exclude: spec.exclude.clone(),
            platform: spec.platform.clone(),
            tag: spec.tag.clone(),
        });
        pending.remove(&build.id);
    }

    let added: Vec<PlannedResource> = graph
        .nodes()
        .iter()
        .filter(|node| node.kind != ResourceKind::ImageBuild)
        .filter(|node| !provisioned.contains(&node.id))
        .map(|node| PlannedResource {
            id: node.id.clone(),
            kind: node.kind,
        })
        .collect();

    if !added.is_empty() || steps.is_empty() {
        provisioned.extend(added.iter().map(|r| r.id.clone()));
        steps.push(DeployStep::Provision {
            stage: stage + 1,
            added,
            resources: in_construction_order(graph, &provisioned),
        });
    }

    Ok(DeployPlan { steps })
}

fn in_construction_order(graph: &ResourceGraph, ids: &[ResourceId]) -> Vec<ResourceId> {
    graph
        .nodes()
        .iter()
        .filter(|node| ids.contains(&node.id))
        .map(|node| node.id.clone())
        .collect()
}

/// Pure function: Calculate destroy plan.
pub fn calculate_destroy_plan(
    stack_exists: bool,
    stack_name: &str,
    graph: &ResourceGraph,
) -> Result<DestroyPlan, ScheduleError> {
    if !stack_exists {
        return Ok(DestroyPlan::AlreadyGone {
            stack_name: stack_name.to_string(),
        });
    }

    let mut order = graph.topological_order()?;
    order.reverse();
    let resources = order
        .iter()
        .filter_map(|id| graph.get(id))
        .filter(|node| !matches!(node.kind, ResourceKind::ImageBuild | ResourceKind::Output))
        .map(|node| PlannedResource {
            id: node.id.clone(),
            kind: node.kind,
        })
        .collect();

    Ok(DestroyPlan::DeleteStack {
        stack_name: stack_name.to_string(),
        resources,
    })
}

/// Pure function: Format a deploy plan for display.
pub fn format_deploy_plan(plan: &DeployPlan) -> Vec<String> {
    let mut lines = Vec::new();
    let mut previous = 0;

    for step in &plan.steps {
        match step {
            DeployStep::Provision {
                stage,
                added,
                resources,
            } => {
                lines.push(format!(
                    "+ Stage {}: provision {} resource(s)",
                    stage,
                    resources.len()
                ));
                if previous > 0 {
                    lines.push(format!("  = {} resource(s) from earlier stages", previous));
                }
                for resource in added {
                    lines.push(format!("  + {} ({})", resource.id, resource.kind));
                }
                previous = resources.len();
            }
            DeployStep::PublishImage {
                build,
                repository,
                repository_output,
                directory,
                exclude,
                platform,
                tag,
            } => {
                lines.push(format!("+ Publish image: {}", build));
                lines.push(format!("  Context: {}", directory));
                if !exclude.is_empty() {
                    lines.push(format!("  Exclude: {}", exclude.join(", ")));
                }
                lines.push(format!("  Platform: {}", platform));
                lines.push(format!(
                    "  Destination: {}:{} (output {})",
                    repository, tag, repository_output
                ));
            }
        }
    }

    lines
}

/// Pure function: Format a destroy plan for display.
pub fn format_destroy_plan(plan: &DestroyPlan) -> Vec<String> {
    match plan {
        DestroyPlan::DeleteStack {
            stack_name,
            resources,
        } => {
            let mut lines = vec![format!(
                "- Delete stack: {} (ALL RESOURCES AND IMAGES WILL BE LOST)",
                stack_name
            )];
            for resource in resources {
                lines.push(format!("  - {} ({})", resource.id, resource.kind));
            }
            lines
        }
        DestroyPlan::AlreadyGone { stack_name } => {
            vec![format!("= Stack '{}' does not exist", stack_name)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, StackOptions};
    use crate::graph::Attribute;
    use crate::resources::{ImageBuild, ImageRepository, RemovalPolicy};
    use crate::topology::{build_topology, ids};

    fn reference_graph() -> ResourceGraph {
        build_topology(&StackOptions::reference(), &Environment::default()).unwrap()
    }

    fn stage_ids(step: &DeployStep) -> Vec<&str> {
        match step {
            DeployStep::Provision { added, .. } => added.iter().map(|r| r.id.as_str()).collect(),
            DeployStep::PublishImage { .. } => Vec::new(),
        }
    }

    #[test]
    fn test_deploy_plan_publishes_between_stages() {
        let plan = calculate_deploy_plan(&reference_graph()).unwrap();
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.stage_count(), 2);

        assert_eq!(
            stage_ids(&plan.steps[0]),
            vec![
                ids::NETWORK,
                ids::IMAGE_REPOSITORY,
                ids::CLUSTER,
                ids::TASK_ROLE,
                ids::EXECUTION_ROLE,
                ids::SERVICE_SECURITY_RULE,
                ids::LOAD_BALANCER,
                ids::AGENT_URL,
                ids::REPOSITORY_URI,
            ]
        );

        match &plan.steps[1] {
            DeployStep::PublishImage {
                build,
                repository,
                repository_output,
                tag,
                ..
            } => {
                assert_eq!(build.as_str(), ids::IMAGE_BUILD);
                assert_eq!(repository.resource.as_str(), ids::IMAGE_REPOSITORY);
                assert_eq!(repository.attribute, Attribute::Uri);
                assert_eq!(repository_output, ids::REPOSITORY_URI);
                assert_eq!(tag, "latest");
            }
            other => panic!("expected a publish step, got {other:?}"),
        }

        assert_eq!(
            stage_ids(&plan.steps[2]),
            vec![ids::TASK_SPEC, ids::SERVICE, ids::TARGET_GROUP, ids::LISTENER]
        );
    }

    #[test]
    fn test_stages_are_cumulative() {
        let graph = reference_graph();
        let plan = calculate_deploy_plan(&graph).unwrap();
        let DeployStep::Provision { resources, .. } = &plan.steps[2] else {
            panic!("expected a provision step");
        };
        // Everything except the image build, which is not an engine resource.
        assert_eq!(resources.len(), graph.len() - 1);
        assert_eq!(resources[0].as_str(), ids::NETWORK);
    }

    #[test]
    fn test_graph_without_builds_is_one_stage() {
        let mut graph = ResourceGraph::new();
        graph
            .add(
                "Repository",
                Resource::ImageRepository(ImageRepository {
                    name: "agent".into(),
                    removal_policy: RemovalPolicy::Destroy,
                    scan_on_push: true,
                    empty_on_delete: true,
                }),
            )
            .unwrap();
        let plan = calculate_deploy_plan(&graph).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(stage_ids(&plan.steps[0]), vec!["Repository"]);
    }

    #[test]
    fn test_build_without_exposed_repository_fails() {
        let mut graph = ResourceGraph::new();
        graph
            .add(
                "Repository",
                Resource::ImageRepository(ImageRepository {
                    name: "agent".into(),
                    removal_policy: RemovalPolicy::Destroy,
                    scan_on_push: true,
                    empty_on_delete: true,
                }),
            )
            .unwrap();
        let repository = AttrRef::new(&ResourceId::new("Repository"), Attribute::Uri);
        graph
            .add(
                "Build",
                Resource::ImageBuild(ImageBuild {
                    directory: ".".into(),
                    exclude: Vec::new(),
                    platform: "linux/amd64".into(),
                    repository: repository.clone(),
                    tag: "latest".into(),
                }),
            )
            .unwrap();

        assert_eq!(
            calculate_deploy_plan(&graph).unwrap_err(),
            ScheduleError::UnexposedRepository {
                build: ResourceId::new("Build"),
                repository,
            }
        );
    }

    #[test]
    fn test_destroy_plan_deletes_dependents_first() {
        let graph = reference_graph();
        let plan = calculate_destroy_plan(true, "CloudEngineerAgentStack", &graph).unwrap();
        let DestroyPlan::DeleteStack { resources, .. } = &plan else {
            panic!("expected a delete plan");
        };
        let position = |id: &str| resources.iter().position(|r| r.id.as_str() == id).unwrap();
        assert!(position(ids::LISTENER) < position(ids::LOAD_BALANCER));
        assert!(position(ids::SERVICE) < position(ids::CLUSTER));
        assert!(position(ids::CLUSTER) < position(ids::NETWORK));
        assert!(!resources.iter().any(|r| r.kind == ResourceKind::Output));
    }

    #[test]
    fn test_destroy_plan_already_gone() {
        let plan =
            calculate_destroy_plan(false, "CloudEngineerAgentStack", &reference_graph()).unwrap();
        assert_eq!(
            format_destroy_plan(&plan),
            vec!["= Stack 'CloudEngineerAgentStack' does not exist".to_string()]
        );
    }

    #[test]
    fn test_format_deploy_plan() {
        let lines = format_deploy_plan(&calculate_deploy_plan(&reference_graph()).unwrap());
        assert_eq!(lines[0], "+ Stage 1: provision 9 resource(s)");
        assert_eq!(lines[1], "  + Network (Network)");
        assert!(lines.contains(&"+ Publish image: ImageBuild".to_string()));
        assert!(lines.contains(
            &"  Destination: ImageRepository.uri:latest (output RepositoryUri)".to_string()
        ));
        assert!(lines.contains(&"+ Stage 2: provision 13 resource(s)".to_string()));
        assert!(lines.contains(&"  = 9 resource(s) from earlier stages".to_string()));
    }

    #[test]
    fn test_format_destroy_plan() {
        let plan = calculate_destroy_plan(true, "Agent", &reference_graph()).unwrap();
        let lines = format_destroy_plan(&plan);
        assert_eq!(
            lines[0],
            "- Delete stack: Agent (ALL RESOURCES AND IMAGES WILL BE LOST)"
        );
        assert!(lines[1].starts_with("  - "));
    }
}
