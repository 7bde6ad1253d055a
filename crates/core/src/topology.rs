//! Resource Topology Builder (Functional Core - pure, single pass).
//!
//! Builds the agent's resource graph from a validated [`StackConfig`]. Each
//! step only reads attributes of nodes added by earlier steps.

use crate::config::{Environment, StackConfig, StackOptions};
use crate::error::{ConfigurationError, TopologyError};
use crate::graph::{AttrRef, Attribute, ResourceGraph, ResourceId};
use crate::resources::{
    AccessRole, ApplicationProtocol, Cluster, ContainerDefinition, Direction,
    EnvironmentVariable, HealthCheck, ImageBuild, ImageReference, ImageRepository, Listener,
    LoadBalancer, LogConfiguration, LogDriver, Network, Output, PolicyStatement, PortMapping,
    Protocol, RemovalPolicy, Resource, SecurityRule, Service, ServiceTarget, Subnet, SubnetType,
    TargetGroup, TargetType, TaskSpec, ValueFragment,
};

/// Node identifiers, also used as engine logical ids.
pub mod ids {
    pub const NETWORK: &str = "Network";
    pub const IMAGE_REPOSITORY: &str = "ImageRepository";
    pub const IMAGE_BUILD: &str = "ImageBuild";
    pub const CLUSTER: &str = "Cluster";
    pub const TASK_ROLE: &str = "TaskRole";
    pub const EXECUTION_ROLE: &str = "ExecutionRole";
    pub const TASK_SPEC: &str = "TaskSpec";
    pub const SERVICE_SECURITY_RULE: &str = "ServiceSecurityRule";
    pub const SERVICE: &str = "Service";
    pub const LOAD_BALANCER: &str = "LoadBalancer";
    pub const TARGET_GROUP: &str = "TargetGroup";
    pub const LISTENER: &str = "Listener";
    pub const AGENT_URL: &str = "AgentUrl";
    pub const REPOSITORY_URI: &str = "RepositoryUri";
}

pub const CONTAINER_NAME: &str = "CloudEngineerAgentContainer";
pub const TASK_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
pub const READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/ReadOnlyAccess";
pub const EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";
pub const MODEL_INVOCATION_ACTIONS: [&str; 2] =
    ["bedrock:InvokeModel", "bedrock:InvokeModelWithResponseStream"];

/// Validates `options` and builds the resource graph.
pub fn build_topology(
    options: &StackOptions,
    environment: &Environment,
) -> Result<ResourceGraph, TopologyError> {
    let config = StackConfig::new(options, environment.clone())?;
    TopologyBuilder::new(config).build()
}

/// Builds a resource graph from an already validated configuration.
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    config: StackConfig,
}

impl TopologyBuilder {
    pub fn new(config: StackConfig) -> Self {
        Self { config }
    }

    pub fn build(&self) -> Result<ResourceGraph, TopologyError> {
        let mut graph = ResourceGraph::new();

        let network = self.add_network(&mut graph)?;
        let repository = self.add_image_repository(&mut graph)?;
        let build = self.add_image_build(&mut graph, &repository)?;
        let cluster = self.add_cluster(&mut graph, &network)?;
        let (task_role, execution_role) = self.add_access_roles(&mut graph)?;
        let task =
            self.add_task_spec(&mut graph, &task_role, &execution_role, &repository, &build)?;
        let rule = self.add_security_rule(&mut graph, &network)?;
        let service = self.add_service(&mut graph, &cluster, &task, &network, &rule)?;
        let load_balancer = self.add_load_balancer(&mut graph, &network)?;
        let target_group = self.add_target_group(&mut graph, &network, &service)?;
        self.add_listener(&mut graph, &load_balancer, &target_group)?;
        self.add_outputs(&mut graph, &load_balancer, &repository)?;

        Ok(graph)
    }

    fn add(
        graph: &mut ResourceGraph,
        id: &str,
        resource: Resource,
    ) -> Result<ResourceId, TopologyError> {
        Ok(graph.add(id, resource)?.id.clone())
    }

    fn add_network(&self, graph: &mut ResourceGraph) -> Result<ResourceId, TopologyError> {
        let network = &self.config.network;
        let subnets = (0..network.max_availability_zones)
            .map(|index| {
                network
                    .cidr
                    .subnet(network.subnet_cidr_mask, u32::from(index))
                    .map(|cidr| Subnet {
                        name: format!("Public{}", index + 1),
                        cidr,
                        subnet_type: SubnetType::Public,
                        availability_zone_index: index,
                    })
                    .ok_or_else(|| {
                        ConfigurationError::invalid(
                            crate::config::params::MAX_AVAILABILITY_ZONES,
                            format!(
                                "{} /{} subnets do not fit in {}",
                                network.max_availability_zones,
                                network.subnet_cidr_mask,
                                network.cidr
                            ),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::add(
            graph,
            ids::NETWORK,
            Resource::Network(Network {
                cidr: network.cidr,
                max_availability_zones: network.max_availability_zones,
                nat_gateways: 0,
                subnets,
            }),
        )
    }

    fn add_image_repository(&self, graph: &mut ResourceGraph) -> Result<ResourceId, TopologyError> {
        Self::add(
            graph,
            ids::IMAGE_REPOSITORY,
            Resource::ImageRepository(ImageRepository {
                name: self.config.repository.name.clone(),
                removal_policy: RemovalPolicy::Destroy,
                scan_on_push: self.config.repository.scan_on_push,
                empty_on_delete: true,
            }),
        )
    }

    fn add_image_build(
        &self,
        graph: &mut ResourceGraph,
        repository: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        let image = &self.config.image;
        Self::add(
            graph,
            ids::IMAGE_BUILD,
            Resource::ImageBuild(ImageBuild {
                directory: image.directory.clone(),
                exclude: image.exclude.clone(),
                platform: image.platform.clone(),
                repository: AttrRef::new(repository, Attribute::Uri),
                tag: image.tag.clone(),
            }),
        )
    }

    fn add_cluster(
        &self,
        graph: &mut ResourceGraph,
        network: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        Self::add(
            graph,
            ids::CLUSTER,
            Resource::Cluster(Cluster {
                network: AttrRef::new(network, Attribute::Id),
            }),
        )
    }

    fn add_access_roles(
        &self,
        graph: &mut ResourceGraph,
    ) -> Result<(ResourceId, ResourceId), TopologyError> {
        let security = &self.config.security;
        let managed_policies = if security.read_only_access {
            vec![READ_ONLY_POLICY_ARN.to_string()]
        } else {
            Vec::new()
        };

        let task_role = Self::add(
            graph,
            ids::TASK_ROLE,
            Resource::AccessRole(AccessRole {
                principal: TASK_PRINCIPAL.to_string(),
                managed_policies,
                statements: vec![PolicyStatement::allow(
                    &MODEL_INVOCATION_ACTIONS,
                    security.model_invocation_resources.clone(),
                )],
            }),
        )?;

        // Pulls the image and ships container logs on the task's behalf.
        let execution_role = Self::add(
            graph,
            ids::EXECUTION_ROLE,
            Resource::AccessRole(AccessRole {
                principal: TASK_PRINCIPAL.to_string(),
                managed_policies: vec![EXECUTION_POLICY_ARN.to_string()],
                statements: Vec::new(),
            }),
        )?;

        Ok((task_role, execution_role))
    }

    fn add_task_spec(
        &self,
        graph: &mut ResourceGraph,
        task_role: &ResourceId,
        execution_role: &ResourceId,
        repository: &ResourceId,
        build: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        let task = &self.config.task;
        Self::add(
            graph,
            ids::TASK_SPEC,
            Resource::TaskSpec(TaskSpec {
                cpu_units: task.cpu_units,
                memory_mib: task.memory_mib,
                task_role: AttrRef::new(task_role, Attribute::Arn),
                execution_role: AttrRef::new(execution_role, Attribute::Arn),
                container: ContainerDefinition {
                    name: CONTAINER_NAME.to_string(),
                    image: ImageReference {
                        repository: AttrRef::new(repository, Attribute::Uri),
                        tag: self.config.image.tag.clone(),
                        build: build.clone(),
                    },
                    port_mappings: vec![PortMapping {
                        container_port: task.container_port,
                        host_port: task.container_port,
                        protocol: Protocol::Tcp,
                    }],
                    environment: vec![EnvironmentVariable {
                        name: "AWS_REGION".to_string(),
                        value: self.config.environment.region.clone(),
                    }],
                    logging: LogConfiguration {
                        driver: LogDriver::Awslogs,
                        stream_prefix: task.log_stream_prefix.clone(),
                        region: self.config.environment.region.clone(),
                    },
                },
            }),
        )
    }

    fn add_security_rule(
        &self,
        graph: &mut ResourceGraph,
        network: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        Self::add(
            graph,
            ids::SERVICE_SECURITY_RULE,
            Resource::SecurityRule(SecurityRule {
                network: AttrRef::new(network, Attribute::Id),
                description: "Allow access to the Cloud Engineer Agent".to_string(),
                direction: Direction::Ingress,
                protocol: Protocol::Tcp,
                port: self.config.task.container_port,
                source: self.config.security.ingress_source,
                allow_all_outbound: true,
            }),
        )
    }

    fn add_service(
        &self,
        graph: &mut ResourceGraph,
        cluster: &ResourceId,
        task: &ResourceId,
        network: &ResourceId,
        rule: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        // The exposed container comes from the task spec itself.
        let (container_name, container_port, nat_gateways) = match (
            graph.get(task).map(|n| n.resource()),
            graph.get(network).map(|n| n.resource()),
        ) {
            (Some(Resource::TaskSpec(spec)), Some(Resource::Network(net))) => (
                spec.container.name.clone(),
                spec.container
                    .port_mappings
                    .first()
                    .map(|m| m.container_port)
                    .unwrap_or(self.config.task.container_port),
                net.nat_gateways,
            ),
            _ => {
                return Err(TopologyError::ResourceReference {
                    from: ResourceId::new(ids::SERVICE),
                    to: task.clone(),
                })
            }
        };

        Self::add(
            graph,
            ids::SERVICE,
            Resource::Service(Service {
                cluster: AttrRef::new(cluster, Attribute::Id),
                task: AttrRef::new(task, Attribute::Arn),
                desired_count: self.config.service.desired_count,
                subnets: AttrRef::new(network, Attribute::SubnetIds),
                security_group: AttrRef::new(rule, Attribute::GroupId),
                // Public subnets without NAT need a public address to pull images.
                assign_public_ip: nat_gateways == 0,
                container_name,
                container_port,
            }),
        )
    }

    fn add_load_balancer(
        &self,
        graph: &mut ResourceGraph,
        network: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        Self::add(
            graph,
            ids::LOAD_BALANCER,
            Resource::LoadBalancer(LoadBalancer {
                network: AttrRef::new(network, Attribute::Id),
                subnets: AttrRef::new(network, Attribute::SubnetIds),
                internet_facing: true,
                ingress_port: self.config.load_balancer.listener_port,
                ingress_source: crate::config::ANY_IPV4,
            }),
        )
    }

    fn add_target_group(
        &self,
        graph: &mut ResourceGraph,
        network: &ResourceId,
        service: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        let target = match graph.get(service).map(|n| n.resource()) {
            Some(Resource::Service(svc)) => ServiceTarget {
                service: service.clone(),
                container_name: svc.container_name.clone(),
                container_port: svc.container_port,
            },
            _ => {
                return Err(TopologyError::ResourceReference {
                    from: ResourceId::new(ids::TARGET_GROUP),
                    to: service.clone(),
                })
            }
        };

        let health_check = &self.config.load_balancer.health_check;
        Self::add(
            graph,
            ids::TARGET_GROUP,
            Resource::TargetGroup(TargetGroup {
                network: AttrRef::new(network, Attribute::Id),
                port: target.container_port,
                protocol: ApplicationProtocol::Http,
                target_type: TargetType::Ip,
                targets: vec![target],
                health_check: HealthCheck {
                    path: health_check.path.clone(),
                    interval_seconds: health_check.interval_seconds,
                    timeout_seconds: health_check.timeout_seconds,
                },
            }),
        )
    }

    fn add_listener(
        &self,
        graph: &mut ResourceGraph,
        load_balancer: &ResourceId,
        target_group: &ResourceId,
    ) -> Result<ResourceId, TopologyError> {
        Self::add(
            graph,
            ids::LISTENER,
            Resource::Listener(Listener {
                load_balancer: AttrRef::new(load_balancer, Attribute::Arn),
                port: self.config.load_balancer.listener_port,
                protocol: ApplicationProtocol::Http,
                target_group: AttrRef::new(target_group, Attribute::Arn),
            }),
        )
    }

    fn add_outputs(
        &self,
        graph: &mut ResourceGraph,
        load_balancer: &ResourceId,
        repository: &ResourceId,
    ) -> Result<(), TopologyError> {
        let scheme = ApplicationProtocol::Http.scheme();
        Self::add(
            graph,
            ids::AGENT_URL,
            Resource::Output(Output {
                name: ids::AGENT_URL.to_string(),
                description: "URL for the Cloud Engineer Agent".to_string(),
                value: vec![
                    ValueFragment::Literal(format!("{scheme}://")),
                    ValueFragment::Ref(AttrRef::new(load_balancer, Attribute::DnsName)),
                ],
            }),
        )?;

        Self::add(
            graph,
            ids::REPOSITORY_URI,
            Resource::Output(Output {
                name: ids::REPOSITORY_URI.to_string(),
                description: "ECR Repository URI".to_string(),
                value: vec![ValueFragment::Ref(AttrRef::new(repository, Attribute::Uri))],
            }),
        )?;

        Ok(())
    }
}
