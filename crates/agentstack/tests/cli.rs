//! Offline command tests. Nothing here talks to AWS.
#![allow(clippy::expect_used)]

use std::path::Path;
use std::process::Command;

use assert_cmd::cargo;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Runs in an empty directory with no configuration from the environment.
fn agentstack(dir: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("agentstack"));
    cmd.current_dir(dir)
        .env_remove("AGENTSTACK_CONFIG")
        .env_remove("AGENTSTACK_ACCOUNT")
        .env_remove("AGENTSTACK_REGION")
        .env_remove("AWS_REGION")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace() -> TempDir {
    TempDir::new().expect("temp dir")
}

#[test]
fn test_help() {
    let dir = workspace();
    agentstack(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provision the cloud engineer agent stack"));
}

#[test]
fn test_check_requires_repository_name() {
    let dir = workspace();
    agentstack(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required parameter `repositoryName`"));
}

#[test]
fn test_check_with_flags() {
    let dir = workspace();
    agentstack(dir.path())
        .args(["check", "--repository-name", "agent"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid."))
        .stdout(predicate::str::contains("security.readOnlyAccess"));
}

#[test]
fn test_container_port_out_of_range() {
    let dir = workspace();
    agentstack(dir.path())
        .args(["check", "--repository-name", "agent", "--container-port", "70000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "`containerPort` must be between 1 and 65535 (got 70000)",
        ));
}

#[test]
fn test_negative_listener_port_reaches_validation() {
    let dir = workspace();
    agentstack(dir.path())
        .args(["check", "--repository-name", "agent", "--listener-port", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("listenerPort"));
}

#[test]
fn test_health_check_timeout_must_be_below_interval() {
    let dir = workspace();
    agentstack(dir.path())
        .args([
            "check",
            "--repository-name",
            "agent",
            "--health-check-interval-seconds",
            "10",
            "--health-check-timeout-seconds",
            "10",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("healthCheckTimeoutSeconds"));
}

#[test]
fn test_invalid_region() {
    let dir = workspace();
    agentstack(dir.path())
        .env("AGENTSTACK_REGION", "not a region")
        .args(["check", "--repository-name", "agent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("region"));
}

#[test]
fn test_init_then_check_uses_default_file() {
    let dir = workspace();
    agentstack(dir.path()).arg("init").assert().success();
    assert!(dir.path().join("agentstack.toml").is_file());

    agentstack(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    agentstack(dir.path())
        .args(["check", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"stackName\": \"CloudEngineerAgentStack\""));
}

#[test]
fn test_explicit_config_must_exist() {
    let dir = workspace();
    agentstack(dir.path())
        .args(["check", "--config", "missing.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml' not found"));
}

#[test]
fn test_unknown_config_key_is_rejected() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("agent.toml"),
        "repositoryName = \"agent\"\ncontainerPorts = 80\n",
    )
    .expect("write config");

    agentstack(dir.path())
        .args(["check", "--config", "agent.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown option `containerPorts`"));
}

#[test]
fn test_strict_check_fails_on_warnings() {
    let dir = workspace();
    agentstack(dir.path())
        .args([
            "check",
            "--strict",
            "--repository-name",
            "agent",
            "--read-only-access",
            "false",
        ])
        .assert()
        .success();

    agentstack(dir.path())
        .args(["check", "--strict", "--repository-name", "agent", "--reference-security"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("warning(s)"));
}

#[test]
fn test_synth_template() {
    let dir = workspace();
    let output = agentstack(dir.path())
        .args(["synth", "--template", "--repository-name", "agent"])
        .output()
        .expect("run synth");
    assert!(output.status.success());

    let template: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("template is JSON");
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    assert_eq!(
        template["Resources"]["ImageRepository"]["Properties"]["RepositoryName"],
        "agent"
    );
    assert!(template["Outputs"]["AgentUrl"].is_object());
}

#[test]
fn test_synth_manifest_to_file() {
    let dir = workspace();
    agentstack(dir.path())
        .args(["synth", "--repository-name", "agent", "--out", "manifest.json"])
        .assert()
        .success();

    let manifest = std::fs::read_to_string(dir.path().join("manifest.json")).expect("read");
    let manifest: serde_json::Value = serde_json::from_str(&manifest).expect("manifest is JSON");
    assert_eq!(manifest["stackName"], "CloudEngineerAgentStack");
    assert!(manifest["waves"].as_array().is_some_and(|waves| !waves.is_empty()));
}

#[test]
fn test_graph_json() {
    let dir = workspace();
    let output = agentstack(dir.path())
        .args(["graph", "--format", "json", "--repository-name", "agent"])
        .output()
        .expect("run graph");
    assert!(output.status.success());

    let graph: serde_json::Value = serde_json::from_slice(&output.stdout).expect("graph is JSON");
    assert_eq!(graph["waves"][0][0], "Network");
    assert!(graph["edges"]
        .as_array()
        .expect("edges")
        .iter()
        .any(|edge| edge["from"] == "Listener" && edge["to"] == "LoadBalancer"));
}

#[test]
fn test_plan_publishes_between_stages() {
    let dir = workspace();
    agentstack(dir.path())
        .args(["plan", "--repository-name", "agent"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stage 1"))
        .stdout(predicate::str::contains("Publish image: ImageBuild"))
        .stdout(predicate::str::contains("Stage 2"));
}

#[test]
fn test_quiet_suppresses_graph_and_plan() {
    let dir = workspace();
    for command in ["graph", "plan"] {
        agentstack(dir.path())
            .args([command, "--quiet", "--repository-name", "agent"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    agentstack(dir.path())
        .args(["plan", "--quiet", "--repository-name", "agent", "--reference-security"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
