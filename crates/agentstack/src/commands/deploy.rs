//! `agentstack deploy` and `agentstack destroy`.

use std::collections::BTreeMap;

use agentstack_core::resources::Resource;
use agentstack_core::{
    calculate_deploy_plan, calculate_destroy_plan, format_deploy_plan, format_destroy_plan,
    render_template, DeployPlan, DeployStep, DestroyPlan, ResourceGraph,
};
use dialoguer::Confirm;
use serde_json::json;

use super::{print_json, report_security, Context, Stack, TEMPLATE_DESCRIPTION};
use crate::engine::{
    caller_account, detect_runtime, load_sdk_config, verify_account, AwsConfig,
    CloudFormationEngine, ImagePublisher, ProvisioningEngine, PublishRequest, RegistryPublisher,
};
use crate::error::{CliError, Result};
use crate::prelude::*;

/// Provision the stack and publish the agent image.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Provision the stack and publish the agent image.

The deploy alternates CloudFormation stages with image publication: the
repository is created first, the image is built from the staged context and
pushed, then the task, service and load balancer wiring are applied.

When the stack already exposes the target repository, the image is pushed
first and the whole template is applied in one stage.

Environment variables:
  AGENTSTACK_ACCOUNT  - Expected account (verified against the credentials)
  AGENTSTACK_REGION   - Target region (falls back to AWS_REGION, then us-east-1)
  AWS_ENDPOINT_URL    - Use a local endpoint
  AWS_PROFILE         - AWS profile to use for credentials")]
pub struct DeployCommand {
    /// Skip confirmation prompts
    #[arg(long)]
    pub force: bool,

    /// Prefer podman over docker for image builds
    #[arg(long)]
    pub podman: bool,
}

/// Delete the stack.
#[derive(Debug, clap::Parser)]
pub struct DestroyCommand {
    /// Skip confirmation prompts
    #[arg(long)]
    pub force: bool,
}

fn confirm(prompt: &str, default: bool) -> Result<()> {
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(|e| CliError::Prompt(e.to_string()))?;

    if confirmed {
        Ok(())
    } else {
        Err(CliError::UserCancelled)
    }
}

/// Pure function: Whether the live stack already exposes every repository
/// the plan publishes to, so intermediate stages can be folded into the
/// final apply.
pub fn repositories_live(
    plan: &DeployPlan,
    graph: &ResourceGraph,
    outputs: &BTreeMap<String, String>,
) -> bool {
    plan.steps.iter().all(|step| match step {
        DeployStep::PublishImage {
            repository,
            repository_output,
            ..
        } => {
            let name = match graph.get(&repository.resource).map(|node| node.resource()) {
                Some(Resource::ImageRepository(repository)) => &repository.name,
                _ => return false,
            };
            outputs
                .get(repository_output)
                .is_some_and(|uri| uri.ends_with(&format!("/{}", name)))
        }
        DeployStep::Provision { .. } => true,
    })
}

fn publish_request(
    stack: &Stack,
    step: &DeployStep,
    repository_uri: String,
) -> Option<PublishRequest> {
    match step {
        DeployStep::PublishImage {
            directory,
            exclude,
            platform,
            tag,
            ..
        } => Some(PublishRequest {
            repository_uri,
            tag: tag.clone(),
            directory: stack.resolved.resolve_path(directory),
            exclude: exclude.clone(),
            platform: platform.clone(),
        }),
        DeployStep::Provision { .. } => None,
    }
}

/// Executes a deploy plan and returns the stack outputs.
pub async fn execute_deploy_plan(
    engine: &dyn ProvisioningEngine,
    publisher: &dyn ImagePublisher,
    stack: &Stack,
    plan: &DeployPlan,
) -> Result<BTreeMap<String, String>> {
    let stack_name = stack.config.stack_name.as_str();
    let final_stage = plan.stage_count();

    let fold_stages = engine.stack_exists(stack_name).await?
        && repositories_live(plan, &stack.graph, &engine.outputs(stack_name).await?);
    if fold_stages {
        tracing::info!(stack = stack_name, "repository is live, publishing before a single apply");
    }

    for step in &plan.steps {
        match step {
            DeployStep::Provision {
                stage, resources, ..
            } => {
                if fold_stages && *stage < final_stage {
                    tracing::debug!(stage = *stage, "folded into the final stage");
                    continue;
                }

                let subgraph = stack.graph.subgraph(resources)?;
                let template = render_template(&subgraph, TEMPLATE_DESCRIPTION)?;
                let body = serde_json::to_string(&template)?;

                tracing::info!(stage = *stage, resources = resources.len(), "applying stage");
                let outcome = engine.apply(stack_name, &body).await?;
                tracing::info!(stage = *stage, outcome = outcome.as_str(), "stage applied");
            }
            DeployStep::PublishImage {
                build,
                repository_output,
                ..
            } => {
                let outputs = engine.outputs(stack_name).await?;
                let repository_uri = outputs.get(repository_output).cloned().ok_or_else(|| {
                    CliError::MissingOutput {
                        stack_name: stack_name.to_string(),
                        output: repository_output.clone(),
                    }
                })?;

                if let Some(request) = publish_request(stack, step, repository_uri) {
                    tracing::info!(
                        build = %build,
                        image = %request.image_reference(),
                        context = %request.directory.display(),
                        "publishing image"
                    );
                    publisher.publish(&request).await?;
                }
            }
        }
    }

    engine.outputs(stack_name).await
}

/// Executes a destroy plan.
pub async fn execute_destroy_plan(
    engine: &dyn ProvisioningEngine,
    plan: &DestroyPlan,
) -> Result<()> {
    match plan {
        DestroyPlan::DeleteStack { stack_name, .. } => engine.destroy(stack_name).await,
        DestroyPlan::AlreadyGone { .. } => Ok(()),
    }
}

pub async fn run_deploy(cmd: DeployCommand, context: &Context) -> Result<()> {
    let global = &context.global;
    let stack = context.stack()?;
    report_security(&stack.config, global);
    let plan = calculate_deploy_plan(&stack.graph)?;

    let aws_config = AwsConfig::new(&context.environment);

    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), context.environment.target_display());
        aprintln!("{} {}", p_b("Endpoint:"), aws_config.target_display());
        aprintln!("{} {}", p_b("Stack:"), stack.config.stack_name);
        aprintln!();
        aprintln!("{}", p_c("Deploy Plan:"));
        for line in format_deploy_plan(&plan) {
            aprintln!("  {}", paint_plan_line(&line));
        }
        aprintln!();
    }

    let sdk_config = load_sdk_config(&aws_config).await;
    if let Some(expected) = context.environment.account.as_deref() {
        let actual = caller_account(&sdk_config).await?;
        verify_account(Some(expected), &actual)?;
        tracing::debug!(account = %actual, "verified target account");
    }

    let runtime = detect_runtime(cmd.podman).await?;

    if !cmd.force {
        confirm("Apply these changes?", true)?;
    }

    if !global.is_silent() {
        aprintln!("{}", p_b("Applying changes..."));
    }

    let engine = CloudFormationEngine::new(&sdk_config);
    let publisher = RegistryPublisher::new(&sdk_config, runtime);
    let outputs = execute_deploy_plan(&engine, &publisher, &stack, &plan).await?;

    if global.is_json() {
        print_json(&json!({
            "stackName": stack.config.stack_name,
            "outputs": outputs,
        }))?;
    } else if !global.is_silent() {
        aprintln!();
        aprintln!("{}", p_c("Outputs:"));
        for (name, value) in &outputs {
            aprintln!("  {} = {}", name, value);
        }
        aprintln!();
        aprintln!("{}", p_g("Stack deployed successfully."));
    }

    Ok(())
}

pub async fn run_destroy(cmd: DestroyCommand, context: &Context) -> Result<()> {
    let global = &context.global;
    let stack = context.stack()?;
    let aws_config = AwsConfig::new(&context.environment);

    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), context.environment.target_display());
        aprintln!("{} {}", p_b("Endpoint:"), aws_config.target_display());
        aprintln!();
    }

    let sdk_config = load_sdk_config(&aws_config).await;
    if let Some(expected) = context.environment.account.as_deref() {
        let actual = caller_account(&sdk_config).await?;
        verify_account(Some(expected), &actual)?;
    }

    let engine = CloudFormationEngine::new(&sdk_config);
    let exists = engine.stack_exists(&stack.config.stack_name).await?;
    let plan = calculate_destroy_plan(exists, &stack.config.stack_name, &stack.graph)?;

    if !global.is_silent() {
        aprintln!("{}", p_y("Destroy Plan:"));
        for line in format_destroy_plan(&plan) {
            aprintln!("  {}", paint_plan_line(&line));
        }
        aprintln!();
    }

    if matches!(plan, DestroyPlan::AlreadyGone { .. }) {
        if global.is_json() {
            print_json(&plan)?;
        } else if !global.is_silent() {
            aprintln!("{}", p_g("Nothing to destroy."));
        }
        return Ok(());
    }

    if !cmd.force {
        confirm(
            "Are you sure you want to delete this stack? ALL RESOURCES AND IMAGES WILL BE LOST",
            false,
        )?;
    }

    if !global.is_silent() {
        aprintln!("{}", p_b("Deleting stack..."));
    }

    execute_destroy_plan(&engine, &plan).await?;

    if global.is_json() {
        print_json(&plan)?;
    } else if !global.is_silent() {
        aprintln!("{}", p_g("Stack destroyed successfully."));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use agentstack_core::{Environment, StackConfig, StackOptions, TopologyBuilder};
    use async_trait::async_trait;

    use crate::engine::ApplyOutcome;
    use crate::error::ResourceFailure;
    use crate::options::ResolvedOptions;

    const REPOSITORY_URI: &str =
        "123456789012.dkr.ecr.us-east-1.amazonaws.com/cloud-engineer-agent";

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Default)]
    struct FakeEngine {
        log: Log,
        exists: Mutex<bool>,
        outputs: Mutex<BTreeMap<String, String>>,
        templates: Mutex<Vec<serde_json::Value>>,
        fail_with: Option<String>,
        expose_outputs: bool,
    }

    impl FakeEngine {
        fn new(log: Log) -> Self {
            Self {
                log,
                expose_outputs: true,
                ..Self::default()
            }
        }

        fn existing(log: Log, repository_uri: &str) -> Self {
            let engine = Self::new(log);
            *engine.exists.lock().unwrap() = true;
            engine
                .outputs
                .lock()
                .unwrap()
                .insert("RepositoryUri".to_string(), repository_uri.to_string());
            engine
        }

        fn resource_names(&self, index: usize) -> Vec<String> {
            self.templates.lock().unwrap()[index]["Resources"]
                .as_object()
                .unwrap()
                .keys()
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ProvisioningEngine for FakeEngine {
        async fn stack_exists(&self, _stack_name: &str) -> Result<bool> {
            Ok(*self.exists.lock().unwrap())
        }

        async fn apply(&self, stack_name: &str, template_body: &str) -> Result<ApplyOutcome> {
            self.log.lock().unwrap().push("apply".to_string());
            if let Some(reason) = &self.fail_with {
                return Err(CliError::Reconciliation {
                    stack_name: stack_name.to_string(),
                    status: "ROLLBACK_COMPLETE".to_string(),
                    failures: vec![ResourceFailure {
                        logical_id: "ImageRepository".to_string(),
                        resource_type: "AWS::ECR::Repository".to_string(),
                        status: "CREATE_FAILED".to_string(),
                        reason: reason.clone(),
                    }],
                });
            }

            let template: serde_json::Value = serde_json::from_str(template_body).unwrap();
            if self.expose_outputs {
                let mut outputs = self.outputs.lock().unwrap();
                if template["Outputs"].get("RepositoryUri").is_some() {
                    outputs.insert("RepositoryUri".to_string(), REPOSITORY_URI.to_string());
                }
                if template["Outputs"].get("AgentUrl").is_some() {
                    outputs.insert(
                        "AgentUrl".to_string(),
                        "http://agent.elb.amazonaws.com".to_string(),
                    );
                }
            }
            self.templates.lock().unwrap().push(template);

            let mut exists = self.exists.lock().unwrap();
            let outcome = if *exists {
                ApplyOutcome::Updated
            } else {
                ApplyOutcome::Created
            };
            *exists = true;
            Ok(outcome)
        }

        async fn outputs(&self, _stack_name: &str) -> Result<BTreeMap<String, String>> {
            Ok(self.outputs.lock().unwrap().clone())
        }

        async fn destroy(&self, _stack_name: &str) -> Result<()> {
            self.log.lock().unwrap().push("destroy".to_string());
            *self.exists.lock().unwrap() = false;
            Ok(())
        }
    }

    struct FakePublisher {
        log: Log,
        requests: Mutex<Vec<PublishRequest>>,
    }

    #[async_trait]
    impl ImagePublisher for FakePublisher {
        async fn publish(&self, request: &PublishRequest) -> Result<()> {
            self.log.lock().unwrap().push("publish".to_string());
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn fakes(engine: impl FnOnce(Log) -> FakeEngine) -> (Log, FakeEngine, FakePublisher) {
        let log: Log = Arc::default();
        let publisher = FakePublisher {
            log: log.clone(),
            requests: Mutex::default(),
        };
        (log.clone(), engine(log), publisher)
    }

    fn reference_stack() -> Stack {
        let options = StackOptions::reference();
        let config = StackConfig::new(&options, Environment::default()).unwrap();
        let graph = TopologyBuilder::new(config.clone()).build().unwrap();
        Stack {
            resolved: ResolvedOptions {
                options,
                source: None,
                base_dir: PathBuf::from("/work/agent"),
            },
            config,
            graph,
        }
    }

    #[tokio::test]
    async fn test_fresh_deploy_publishes_between_stages() {
        let stack = reference_stack();
        let plan = calculate_deploy_plan(&stack.graph).unwrap();
        let (log, engine, publisher) = fakes(FakeEngine::new);

        let outputs = execute_deploy_plan(&engine, &publisher, &stack, &plan)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["apply", "publish", "apply"]);

        let first = engine.resource_names(0);
        assert!(first.contains(&"ImageRepository".to_string()));
        assert!(!first.contains(&"Service".to_string()));
        assert!(!first.contains(&"TaskSpec".to_string()));
        let second = engine.resource_names(1);
        assert!(second.contains(&"Service".to_string()));
        assert!(second.contains(&"ImageRepository".to_string()));

        let requests = publisher.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].repository_uri, REPOSITORY_URI);
        assert_eq!(requests[0].image_reference(), format!("{REPOSITORY_URI}:latest"));
        assert_eq!(requests[0].directory, PathBuf::from("/work/agent/."));
        assert_eq!(requests[0].platform, "linux/amd64");
        assert!(requests[0].exclude.contains(&"cdk.out".to_string()));

        assert_eq!(
            outputs.get("AgentUrl").map(String::as_str),
            Some("http://agent.elb.amazonaws.com")
        );
    }

    #[tokio::test]
    async fn test_redeploy_folds_stages_when_repository_is_live() {
        let stack = reference_stack();
        let plan = calculate_deploy_plan(&stack.graph).unwrap();
        let (log, engine, publisher) = fakes(|log| FakeEngine::existing(log, REPOSITORY_URI));

        execute_deploy_plan(&engine, &publisher, &stack, &plan)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["publish", "apply"]);
        assert!(engine.resource_names(0).contains(&"Service".to_string()));
    }

    #[tokio::test]
    async fn test_redeploy_with_renamed_repository_runs_every_stage() {
        let stack = reference_stack();
        let plan = calculate_deploy_plan(&stack.graph).unwrap();
        let old_uri = "123456789012.dkr.ecr.us-east-1.amazonaws.com/old-agent";
        let (log, engine, publisher) = fakes(|log| FakeEngine::existing(log, old_uri));

        execute_deploy_plan(&engine, &publisher, &stack, &plan)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["apply", "publish", "apply"]);
        assert_eq!(
            publisher.requests.lock().unwrap()[0].repository_uri,
            REPOSITORY_URI
        );
    }

    #[tokio::test]
    async fn test_missing_repository_output_stops_the_deploy() {
        let stack = reference_stack();
        let plan = calculate_deploy_plan(&stack.graph).unwrap();
        let (log, engine, publisher) = fakes(|log| FakeEngine {
            expose_outputs: false,
            ..FakeEngine::new(log)
        });

        let error = execute_deploy_plan(&engine, &publisher, &stack, &plan)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            CliError::MissingOutput { ref output, .. } if output == "RepositoryUri"
        ));
        assert_eq!(*log.lock().unwrap(), vec!["apply"]);
    }

    #[tokio::test]
    async fn test_reconciliation_failure_is_surfaced_unchanged() {
        let stack = reference_stack();
        let plan = calculate_deploy_plan(&stack.graph).unwrap();
        let reason = "Resource handler returned message: \"cloud-engineer-agent already exists\"";
        let (log, engine, publisher) = fakes(|log| FakeEngine {
            fail_with: Some(reason.to_string()),
            ..FakeEngine::new(log)
        });

        let error = execute_deploy_plan(&engine, &publisher, &stack, &plan)
            .await
            .unwrap_err();

        match error {
            CliError::Reconciliation { failures, .. } => assert_eq!(failures[0].reason, reason),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["apply"]);
        assert!(publisher.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_destroy_plan() {
        let stack = reference_stack();
        let (log, engine, _) = fakes(|log| FakeEngine::existing(log, REPOSITORY_URI));

        let gone = calculate_destroy_plan(false, "CloudEngineerAgentStack", &stack.graph).unwrap();
        execute_destroy_plan(&engine, &gone).await.unwrap();
        assert!(log.lock().unwrap().is_empty());

        let delete = calculate_destroy_plan(true, "CloudEngineerAgentStack", &stack.graph).unwrap();
        execute_destroy_plan(&engine, &delete).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["destroy"]);
        assert!(!engine.stack_exists("CloudEngineerAgentStack").await.unwrap());
    }

    #[test]
    fn test_repositories_live() {
        let stack = reference_stack();
        let plan = calculate_deploy_plan(&stack.graph).unwrap();

        let mut outputs = BTreeMap::new();
        assert!(!repositories_live(&plan, &stack.graph, &outputs));

        outputs.insert("RepositoryUri".to_string(), REPOSITORY_URI.to_string());
        assert!(repositories_live(&plan, &stack.graph, &outputs));

        outputs.insert(
            "RepositoryUri".to_string(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/other".to_string(),
        );
        assert!(!repositories_live(&plan, &stack.graph, &outputs));
    }
}
