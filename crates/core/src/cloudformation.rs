//! CloudFormation template rendering (Functional Core).
//!
//! Each graph node becomes one or more template resources. Attribute
//! references become `Ref` / `Fn::GetAtt`, direct graph edges become
//! `DependsOn`. Image builds happen outside the engine and are skipped.

use serde_json::{json, Map, Value};

use crate::error::{TemplateError, TopologyError};
use crate::graph::{AttrRef, Attribute, Node, ResourceGraph, ResourceId, ResourceKind};
use crate::resources::{
    AccessRole, ContainerDefinition, Effect, LoadBalancer, Network, Output, RemovalPolicy,
    Resource, SecurityRule, Service, TargetGroup, TaskSpec, ValueFragment,
};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
const POLICY_VERSION: &str = "2012-10-17";

type Result<T> = std::result::Result<T, TemplateError>;

/// Renders the whole graph as a CloudFormation template.
pub fn render_template(graph: &ResourceGraph, description: &str) -> Result<Value> {
    let mut resources = Map::new();
    let mut outputs = Map::new();

    for node in graph.nodes() {
        match node.resource() {
            Resource::ImageBuild(_) => {}
            Resource::Output(output) => {
                outputs.insert(output.name.clone(), render_output(graph, output)?);
            }
            resource => render_node(graph, node, resource, &mut resources)?,
        }
    }

    let mut template = Map::new();
    template.insert("AWSTemplateFormatVersion".into(), json!(TEMPLATE_FORMAT_VERSION));
    template.insert("Description".into(), json!(description));
    template.insert("Resources".into(), Value::Object(resources));
    if !outputs.is_empty() {
        template.insert("Outputs".into(), Value::Object(outputs));
    }
    Ok(Value::Object(template))
}

/// Logical ids of the template resources that make up a network's subnets.
pub fn subnet_logical_ids(id: &ResourceId, network: &Network) -> Vec<String> {
    network
        .subnets
        .iter()
        .map(|subnet| format!("{id}{}Subnet", subnet.name))
        .collect()
}

/// Logical ids of the routes and associations giving each subnet its
/// internet path.
fn subnet_route_ids(id: &ResourceId, network: &Network) -> Vec<String> {
    network
        .subnets
        .iter()
        .flat_map(|subnet| {
            [
                format!("{id}{}DefaultRoute", subnet.name),
                format!("{id}{}RouteTableAssociation", subnet.name),
            ]
        })
        .collect()
}

fn internet_gateway_id(id: &ResourceId) -> String {
    format!("{id}InternetGateway")
}

fn gateway_attachment_id(id: &ResourceId) -> String {
    format!("{id}GatewayAttachment")
}

fn log_group_id(id: &ResourceId) -> String {
    format!("{id}LogGroup")
}

fn load_balancer_security_group_id(id: &ResourceId) -> String {
    format!("{id}SecurityGroup")
}

fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// Expresses an attribute reference in template syntax.
fn attribute(graph: &ResourceGraph, attr: &AttrRef) -> Result<Value> {
    let node = graph
        .get(&attr.resource)
        .ok_or_else(|| TopologyError::UnknownResource(attr.resource.clone()))?;
    let id = node.id.as_str();

    let value = match (node.resource(), attr.attribute) {
        (Resource::Network(_), Attribute::Id) => reference(id),
        (Resource::Network(network), Attribute::SubnetIds) => Value::Array(
            subnet_logical_ids(&node.id, network)
                .iter()
                .map(|subnet| reference(subnet))
                .collect(),
        ),
        (Resource::ImageRepository(_), Attribute::Uri) => get_att(id, "RepositoryUri"),
        (Resource::ImageRepository(_), Attribute::Arn) => get_att(id, "Arn"),
        (Resource::ImageRepository(_), Attribute::Name) => reference(id),
        (Resource::Cluster(_), Attribute::Id | Attribute::Name) => reference(id),
        (Resource::Cluster(_), Attribute::Arn) => get_att(id, "Arn"),
        (Resource::AccessRole(_), Attribute::Arn) => get_att(id, "Arn"),
        (Resource::AccessRole(_), Attribute::Name) => reference(id),
        (Resource::TaskSpec(_), Attribute::Arn) => reference(id),
        (Resource::SecurityRule(_), Attribute::GroupId) => get_att(id, "GroupId"),
        (Resource::Service(_), Attribute::Arn) => reference(id),
        (Resource::Service(_), Attribute::Name) => get_att(id, "Name"),
        (Resource::LoadBalancer(_), Attribute::Arn) => reference(id),
        (Resource::LoadBalancer(_), Attribute::DnsName) => get_att(id, "DNSName"),
        (Resource::TargetGroup(_), Attribute::Arn) => reference(id),
        (Resource::Listener(_), Attribute::Arn) => reference(id),
        _ => {
            return Err(TemplateError::UnsupportedAttribute {
                resource: node.id.clone(),
                kind: node.kind,
                attribute: attr.attribute,
            })
        }
    };
    Ok(value)
}

/// Direct graph edges that the engine has to know about.
fn depends_on(graph: &ResourceGraph, node: &Node) -> Vec<String> {
    node.depends_on
        .iter()
        .filter_map(|dep| graph.get(dep))
        .filter(|dep| dep.kind != ResourceKind::ImageBuild)
        // Registration lives on the service, which already depends on the group.
        .filter(|dep| {
            !(node.kind == ResourceKind::TargetGroup && dep.kind == ResourceKind::Service)
        })
        .map(|dep| dep.id.to_string())
        .collect()
}

fn resource(kind: &str, properties: Value, depends: Vec<String>) -> Value {
    let mut entry = Map::new();
    entry.insert("Type".into(), json!(kind));
    if !depends.is_empty() {
        entry.insert("DependsOn".into(), json!(depends));
    }
    entry.insert("Properties".into(), properties);
    Value::Object(entry)
}

fn render_node(
    graph: &ResourceGraph,
    node: &Node,
    resource_kind: &Resource,
    out: &mut Map<String, Value>,
) -> Result<()> {
    let id = &node.id;
    let depends = depends_on(graph, node);

    match resource_kind {
        Resource::Network(network) => render_network(id, network, out),
        Resource::ImageRepository(repository) => {
            let mut entry = resource(
                "AWS::ECR::Repository",
                json!({
                    "RepositoryName": repository.name,
                    "ImageScanningConfiguration": { "ScanOnPush": repository.scan_on_push },
                    "EmptyOnDelete": repository.empty_on_delete,
                }),
                depends,
            );
            let policy = match repository.removal_policy {
                RemovalPolicy::Destroy => "Delete",
                RemovalPolicy::Retain => "Retain",
            };
            if let Value::Object(map) = &mut entry {
                map.insert("DeletionPolicy".into(), json!(policy));
                map.insert("UpdateReplacePolicy".into(), json!(policy));
            }
            out.insert(id.to_string(), entry);
        }
        Resource::Cluster(_) => {
            out.insert(
                id.to_string(),
                resource("AWS::ECS::Cluster", json!({}), depends),
            );
        }
        Resource::AccessRole(role) => {
            out.insert(id.to_string(), render_role(id, role, depends));
        }
        Resource::TaskSpec(task) => render_task(graph, id, task, depends, out)?,
        Resource::SecurityRule(rule) => {
            out.insert(id.to_string(), render_security_rule(graph, rule, depends)?);
        }
        Resource::Service(service) => {
            out.insert(id.to_string(), render_service(graph, id, service, depends)?);
        }
        Resource::LoadBalancer(lb) => render_load_balancer(graph, id, lb, depends, out)?,
        Resource::TargetGroup(group) => {
            out.insert(id.to_string(), render_target_group(graph, group, depends)?);
        }
        Resource::Listener(listener) => {
            out.insert(
                id.to_string(),
                resource(
                    "AWS::ElasticLoadBalancingV2::Listener",
                    json!({
                        "LoadBalancerArn": attribute(graph, &listener.load_balancer)?,
                        "Port": listener.port,
                        "Protocol": listener.protocol.as_str(),
                        "DefaultActions": [{
                            "Type": "forward",
                            "TargetGroupArn": attribute(graph, &listener.target_group)?,
                        }],
                    }),
                    depends,
                ),
            );
        }
        Resource::ImageBuild(_) | Resource::Output(_) => {}
    }
    Ok(())
}

fn render_network(id: &ResourceId, network: &Network, out: &mut Map<String, Value>) {
    let vpc = id.as_str();
    let gateway = internet_gateway_id(id);
    let attachment = gateway_attachment_id(id);

    out.insert(
        vpc.to_string(),
        resource(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": network.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
            }),
            Vec::new(),
        ),
    );
    out.insert(
        gateway.clone(),
        resource("AWS::EC2::InternetGateway", json!({}), Vec::new()),
    );
    out.insert(
        attachment.clone(),
        resource(
            "AWS::EC2::VPCGatewayAttachment",
            json!({ "VpcId": reference(vpc), "InternetGatewayId": reference(&gateway) }),
            Vec::new(),
        ),
    );

    for (subnet, subnet_id) in network.subnets.iter().zip(subnet_logical_ids(id, network)) {
        let route_table = format!("{id}{}RouteTable", subnet.name);
        out.insert(
            subnet_id.clone(),
            resource(
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": reference(vpc),
                    "CidrBlock": subnet.cidr.to_string(),
                    "AvailabilityZone": {
                        "Fn::Select": [subnet.availability_zone_index, { "Fn::GetAZs": "" }]
                    },
                    "MapPublicIpOnLaunch": true,
                }),
                Vec::new(),
            ),
        );
        out.insert(
            route_table.clone(),
            resource(
                "AWS::EC2::RouteTable",
                json!({ "VpcId": reference(vpc) }),
                Vec::new(),
            ),
        );
        out.insert(
            format!("{id}{}DefaultRoute", subnet.name),
            resource(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": reference(&route_table),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": reference(&gateway),
                }),
                vec![attachment.clone()],
            ),
        );
        out.insert(
            format!("{id}{}RouteTableAssociation", subnet.name),
            resource(
                "AWS::EC2::SubnetRouteTableAssociation",
                json!({
                    "RouteTableId": reference(&route_table),
                    "SubnetId": reference(&subnet_id),
                }),
                Vec::new(),
            ),
        );
    }
}

fn render_role(id: &ResourceId, role: &AccessRole, depends: Vec<String>) -> Value {
    let mut properties = Map::new();
    properties.insert(
        "AssumeRolePolicyDocument".into(),
        json!({
            "Version": POLICY_VERSION,
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": role.principal },
                "Action": "sts:AssumeRole",
            }],
        }),
    );
    if !role.managed_policies.is_empty() {
        properties.insert("ManagedPolicyArns".into(), json!(role.managed_policies));
    }
    if !role.statements.is_empty() {
        let statements: Vec<Value> = role
            .statements
            .iter()
            .map(|statement| {
                json!({
                    "Effect": match statement.effect {
                        Effect::Allow => "Allow",
                        Effect::Deny => "Deny",
                    },
                    "Action": statement.actions,
                    "Resource": statement.resources,
                })
            })
            .collect();
        properties.insert(
            "Policies".into(),
            json!([{
                "PolicyName": format!("{id}Policy"),
                "PolicyDocument": { "Version": POLICY_VERSION, "Statement": statements },
            }]),
        );
    }
    resource("AWS::IAM::Role", Value::Object(properties), depends)
}

fn render_container(
    graph: &ResourceGraph,
    container: &ContainerDefinition,
    log_group: &str,
) -> Result<Value> {
    let image = json!({
        "Fn::Join": ["", [
            attribute(graph, &container.image.repository)?,
            format!(":{}", container.image.tag),
        ]]
    });
    let port_mappings: Vec<Value> = container
        .port_mappings
        .iter()
        .map(|mapping| {
            json!({
                "ContainerPort": mapping.container_port,
                "HostPort": mapping.host_port,
                "Protocol": mapping.protocol.as_str(),
            })
        })
        .collect();
    let environment: Vec<Value> = container
        .environment
        .iter()
        .map(|var| json!({ "Name": var.name, "Value": var.value }))
        .collect();

    Ok(json!({
        "Name": container.name,
        "Image": image,
        "Essential": true,
        "PortMappings": port_mappings,
        "Environment": environment,
        "LogConfiguration": {
            "LogDriver": "awslogs",
            "Options": {
                "awslogs-group": reference(log_group),
                "awslogs-stream-prefix": container.logging.stream_prefix,
                "awslogs-region": container.logging.region,
            },
        },
    }))
}

fn render_task(
    graph: &ResourceGraph,
    id: &ResourceId,
    task: &TaskSpec,
    depends: Vec<String>,
    out: &mut Map<String, Value>,
) -> Result<()> {
    let log_group = log_group_id(id);
    out.insert(
        log_group.clone(),
        json!({
            "Type": "AWS::Logs::LogGroup",
            "DeletionPolicy": "Delete",
            "UpdateReplacePolicy": "Delete",
        }),
    );
    out.insert(
        id.to_string(),
        resource(
            "AWS::ECS::TaskDefinition",
            json!({
                "Cpu": task.cpu_units.to_string(),
                "Memory": task.memory_mib.to_string(),
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "TaskRoleArn": attribute(graph, &task.task_role)?,
                "ExecutionRoleArn": attribute(graph, &task.execution_role)?,
                "ContainerDefinitions": [render_container(graph, &task.container, &log_group)?],
            }),
            depends,
        ),
    );
    Ok(())
}

fn render_security_rule(
    graph: &ResourceGraph,
    rule: &SecurityRule,
    depends: Vec<String>,
) -> Result<Value> {
    let mut properties = Map::new();
    properties.insert("GroupDescription".into(), json!(rule.description));
    properties.insert("VpcId".into(), attribute(graph, &rule.network)?);
    properties.insert(
        "SecurityGroupIngress".into(),
        json!([{
            "IpProtocol": rule.protocol.as_str(),
            "FromPort": rule.port,
            "ToPort": rule.port,
            "CidrIp": rule.source.to_string(),
            "Description": rule.description,
        }]),
    );
    if rule.allow_all_outbound {
        properties.insert(
            "SecurityGroupEgress".into(),
            json!([{ "IpProtocol": "-1", "CidrIp": "0.0.0.0/0" }]),
        );
    }
    Ok(resource(
        "AWS::EC2::SecurityGroup",
        Value::Object(properties),
        depends,
    ))
}

fn render_service(
    graph: &ResourceGraph,
    id: &ResourceId,
    service: &Service,
    mut depends: Vec<String>,
) -> Result<Value> {
    // Target groups registering this service, and the listeners feeding them.
    let mut load_balancers = Vec::new();
    for node in graph.nodes() {
        let Resource::TargetGroup(group) = node.resource() else {
            continue;
        };
        for target in group.targets.iter().filter(|t| &t.service == id) {
            load_balancers.push(json!({
                "ContainerName": target.container_name,
                "ContainerPort": target.container_port,
                "TargetGroupArn": reference(node.id.as_str()),
            }));
            for listener in graph.nodes() {
                if let Resource::Listener(l) = listener.resource() {
                    let listener_id = listener.id.to_string();
                    if l.target_group.resource == node.id && !depends.contains(&listener_id) {
                        depends.push(listener_id);
                    }
                }
            }
        }
    }

    // Tasks pull their image over the public address, so the routes must exist.
    if service.assign_public_ip {
        if let Some(Resource::Network(network)) =
            graph.get(&service.subnets.resource).map(Node::resource)
        {
            for route in subnet_route_ids(&service.subnets.resource, network) {
                if !depends.contains(&route) {
                    depends.push(route);
                }
            }
        }
    }

    let assign_public_ip = if service.assign_public_ip { "ENABLED" } else { "DISABLED" };
    let mut properties = Map::new();
    properties.insert("Cluster".into(), attribute(graph, &service.cluster)?);
    properties.insert("TaskDefinition".into(), attribute(graph, &service.task)?);
    properties.insert("DesiredCount".into(), json!(service.desired_count));
    properties.insert("LaunchType".into(), json!("FARGATE"));
    properties.insert(
        "NetworkConfiguration".into(),
        json!({
            "AwsvpcConfiguration": {
                "AssignPublicIp": assign_public_ip,
                "Subnets": attribute(graph, &service.subnets)?,
                "SecurityGroups": [attribute(graph, &service.security_group)?],
            }
        }),
    );
    if !load_balancers.is_empty() {
        properties.insert("LoadBalancers".into(), Value::Array(load_balancers));
    }
    Ok(resource("AWS::ECS::Service", Value::Object(properties), depends))
}

fn render_load_balancer(
    graph: &ResourceGraph,
    id: &ResourceId,
    lb: &LoadBalancer,
    mut depends: Vec<String>,
    out: &mut Map<String, Value>,
) -> Result<()> {
    let security_group = load_balancer_security_group_id(id);
    out.insert(
        security_group.clone(),
        resource(
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("Public ingress for {id}"),
                "VpcId": attribute(graph, &lb.network)?,
                "SecurityGroupIngress": [{
                    "IpProtocol": "tcp",
                    "FromPort": lb.ingress_port,
                    "ToPort": lb.ingress_port,
                    "CidrIp": lb.ingress_source.to_string(),
                }],
            }),
            Vec::new(),
        ),
    );

    // An internet-facing balancer needs the gateway attached first.
    if lb.internet_facing {
        if let Some(network) = graph.get(&lb.network.resource) {
            if network.kind == ResourceKind::Network {
                depends.push(gateway_attachment_id(&network.id));
            }
        }
    }

    let scheme = if lb.internet_facing { "internet-facing" } else { "internal" };
    out.insert(
        id.to_string(),
        resource(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "Type": "application",
                "Scheme": scheme,
                "Subnets": attribute(graph, &lb.subnets)?,
                "SecurityGroups": [reference(&security_group)],
            }),
            depends,
        ),
    );
    Ok(())
}

fn render_target_group(
    graph: &ResourceGraph,
    group: &TargetGroup,
    depends: Vec<String>,
) -> Result<Value> {
    Ok(resource(
        "AWS::ElasticLoadBalancingV2::TargetGroup",
        json!({
            "Port": group.port,
            "Protocol": group.protocol.as_str(),
            "TargetType": "ip",
            "VpcId": attribute(graph, &group.network)?,
            "HealthCheckProtocol": group.protocol.as_str(),
            "HealthCheckPath": group.health_check.path,
            "HealthCheckIntervalSeconds": group.health_check.interval_seconds,
            "HealthCheckTimeoutSeconds": group.health_check.timeout_seconds,
        }),
        depends,
    ))
}

fn render_output(graph: &ResourceGraph, output: &Output) -> Result<Value> {
    let value = match output.single_reference() {
        Some(attr) => attribute(graph, attr)?,
        None => {
            let parts = output
                .value
                .iter()
                .map(|fragment| match fragment {
                    ValueFragment::Literal(text) => Ok(json!(text)),
                    ValueFragment::Ref(attr) => attribute(graph, attr),
                })
                .collect::<Result<Vec<_>>>()?;
            json!({ "Fn::Join": ["", parts] })
        }
    };
    Ok(json!({ "Description": output.description, "Value": value }))
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::config::{Environment, StackOptions};
    use crate::topology::build_topology;

    fn template() -> Value {
        let graph = build_topology(&StackOptions::reference(), &Environment::default()).unwrap();
        render_template(&graph, "Cloud Engineer Agent").unwrap()
    }

    fn collect_refs(value: &Value, refs: &mut HashSet<String>) {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(target)) = map.get("Ref") {
                    refs.insert(target.clone());
                }
                if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                    if let Some(Value::String(target)) = parts.first() {
                        refs.insert(target.clone());
                    }
                }
                map.values().for_each(|v| collect_refs(v, refs));
            }
            Value::Array(items) => items.iter().for_each(|v| collect_refs(v, refs)),
            _ => {}
        }
    }

    /// Every dependency the engine derives: explicit `DependsOn` plus references.
    fn engine_dependencies(template: &Value) -> HashMap<String, HashSet<String>> {
        let resources = template["Resources"].as_object().unwrap();
        resources
            .iter()
            .map(|(id, body)| {
                let mut deps = HashSet::new();
                collect_refs(&body["Properties"], &mut deps);
                if let Some(Value::Array(explicit)) = body.get("DependsOn") {
                    deps.extend(explicit.iter().filter_map(|d| d.as_str()).map(String::from));
                }
                (id.clone(), deps)
            })
            .collect()
    }

    fn reaches(deps: &HashMap<String, HashSet<String>>, from: &str, to: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for next in deps.get(&current).into_iter().flatten() {
                if next == to {
                    return true;
                }
                stack.push(next.clone());
            }
        }
        false
    }

    #[test]
    fn test_template_resource_types() {
        let template = template();
        let resources = template["Resources"].as_object().unwrap();

        assert_eq!(resources["Network"]["Type"], "AWS::EC2::VPC");
        assert_eq!(resources["Network"]["Properties"]["CidrBlock"], "10.0.0.0/16");
        assert_eq!(resources["NetworkPublic1Subnet"]["Type"], "AWS::EC2::Subnet");
        assert_eq!(resources["NetworkPublic2Subnet"]["Type"], "AWS::EC2::Subnet");
        assert_eq!(resources["ImageRepository"]["Type"], "AWS::ECR::Repository");
        assert_eq!(resources["ImageRepository"]["DeletionPolicy"], "Delete");
        assert_eq!(resources["TaskSpec"]["Type"], "AWS::ECS::TaskDefinition");
        assert_eq!(resources["TaskSpecLogGroup"]["Type"], "AWS::Logs::LogGroup");
        assert_eq!(resources["Service"]["Type"], "AWS::ECS::Service");
        assert_eq!(
            resources["LoadBalancerSecurityGroup"]["Type"],
            "AWS::EC2::SecurityGroup"
        );
        assert!(!resources.contains_key("ImageBuild"));
        assert!(!resources.values().any(|r| r["Type"] == "AWS::EC2::NatGateway"));
    }

    #[test]
    fn test_task_definition_properties() {
        let template = template();
        let task = &template["Resources"]["TaskSpec"];
        assert_eq!(task["Properties"]["Cpu"], "1024");
        assert_eq!(task["Properties"]["Memory"], "2048");
        assert_eq!(
            task["Properties"]["TaskRoleArn"],
            json!({ "Fn::GetAtt": ["TaskRole", "Arn"] })
        );
        let container = &task["Properties"]["ContainerDefinitions"][0];
        assert_eq!(container["PortMappings"][0]["ContainerPort"], 8501);
        assert_eq!(
            container["Image"],
            json!({
                "Fn::Join": [
                    "",
                    [{ "Fn::GetAtt": ["ImageRepository", "RepositoryUri"] }, ":latest"]
                ]
            })
        );
        let depends: Vec<&str> = task["DependsOn"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(!depends.contains(&"ImageBuild"));
    }

    #[test]
    fn test_service_registration_has_no_cycle() {
        let template = template();
        let service = &template["Resources"]["Service"];
        assert_eq!(
            service["Properties"]["LoadBalancers"][0]["TargetGroupArn"],
            json!({ "Ref": "TargetGroup" })
        );
        assert!(service["DependsOn"]
            .as_array()
            .unwrap()
            .contains(&json!("Listener")));

        let deps = engine_dependencies(&template);
        for id in deps.keys() {
            assert!(!reaches(&deps, id, id), "cycle through {id}");
        }
        assert!(!reaches(&deps, "TargetGroup", "Service"));
    }

    #[test]
    fn test_public_service_waits_for_routes() {
        let template = template();
        let depends = template["Resources"]["Service"]["DependsOn"].as_array().unwrap();
        for route in [
            "NetworkPublic1DefaultRoute",
            "NetworkPublic1RouteTableAssociation",
            "NetworkPublic2DefaultRoute",
            "NetworkPublic2RouteTableAssociation",
        ] {
            assert!(template["Resources"][route].is_object(), "{route} rendered");
            assert!(depends.contains(&json!(route)), "service waits for {route}");
        }
    }

    #[test]
    fn test_security_groups() {
        let template = template();
        let rule = &template["Resources"]["ServiceSecurityRule"]["Properties"];
        assert_eq!(rule["SecurityGroupIngress"][0]["FromPort"], 8501);
        assert_eq!(rule["SecurityGroupIngress"][0]["CidrIp"], "10.0.0.0/16");

        let lb_group = &template["Resources"]["LoadBalancerSecurityGroup"]["Properties"];
        assert_eq!(lb_group["SecurityGroupIngress"][0]["FromPort"], 80);
        assert_eq!(lb_group["SecurityGroupIngress"][0]["CidrIp"], "0.0.0.0/0");
    }

    #[test]
    fn test_outputs() {
        let template = template();
        assert_eq!(
            template["Outputs"]["AgentUrl"]["Value"],
            json!({ "Fn::Join": ["", ["http://", { "Fn::GetAtt": ["LoadBalancer", "DNSName"] }]] })
        );
        assert_eq!(
            template["Outputs"]["RepositoryUri"]["Value"],
            json!({ "Fn::GetAtt": ["ImageRepository", "RepositoryUri"] })
        );
    }

    #[test]
    fn test_unsupported_attribute() {
        let mut graph = ResourceGraph::new();
        graph
            .add(
                "Network",
                Resource::Network(Network {
                    cidr: "10.0.0.0/16".parse().unwrap(),
                    max_availability_zones: 1,
                    nat_gateways: 0,
                    subnets: Vec::new(),
                }),
            )
            .unwrap();
        graph
            .add(
                "Broken",
                Resource::Output(Output {
                    name: "Broken".into(),
                    description: String::new(),
                    value: vec![ValueFragment::Ref(AttrRef::new(
                        &ResourceId::new("Network"),
                        Attribute::DnsName,
                    ))],
                }),
            )
            .unwrap();

        assert_eq!(
            render_template(&graph, "").unwrap_err(),
            TemplateError::UnsupportedAttribute {
                resource: ResourceId::new("Network"),
                kind: ResourceKind::Network,
                attribute: Attribute::DnsName,
            }
        );
    }
}
