//! Image publication through ECR and a local container runtime.
//!
//! - **Pure functions** decode registry credentials and build runtime
//!   command arguments.
//! - **I/O functions** detect the runtime, log in, build and push.

use std::process::Stdio;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecr::error::DisplayErrorContext;
use base64::Engine as _;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::context::stage_build_context;
use super::{ImagePublisher, PublishRequest};
use crate::error::{CliError, Result};
use crate::prelude::execute_command_streaming;

/// Container runtime (Docker or Podman).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerRuntime {
    #[default]
    Docker,
    Podman,
}

/// Registry credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// Pure function: Get the command name for a container runtime.
pub fn runtime_command(runtime: ContainerRuntime) -> &'static str {
    match runtime {
        ContainerRuntime::Docker => "docker",
        ContainerRuntime::Podman => "podman",
    }
}

/// Pure function: Decode a registry authorization token (`user:password`,
/// base64 encoded).
pub fn decode_registry_token(token: &str) -> Result<RegistryCredentials> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token.trim())
        .map_err(|e| CliError::ImagePublish(format!("invalid registry token: {}", e)))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| CliError::ImagePublish(format!("invalid registry token: {}", e)))?;

    match decoded.split_once(':') {
        Some((username, password)) if !username.is_empty() => Ok(RegistryCredentials {
            username: username.to_string(),
            password: password.to_string(),
        }),
        _ => Err(CliError::ImagePublish(
            "invalid registry token: expected user:password".to_string(),
        )),
    }
}

/// Pure function: Registry host of a repository URI.
pub fn registry_host(repository_uri: &str) -> &str {
    repository_uri
        .split_once('/')
        .map(|(host, _)| host)
        .unwrap_or(repository_uri)
}

/// Builds arguments for `docker login` with the password on stdin.
pub fn login_args(host: &str, username: &str) -> Vec<String> {
    vec![
        "login".to_string(),
        "--username".to_string(),
        username.to_string(),
        "--password-stdin".to_string(),
        host.to_string(),
    ]
}

/// Builds arguments for `docker build`.
pub fn build_args(platform: &str, image: &str, context: &str) -> Vec<String> {
    vec![
        "build".to_string(),
        "--platform".to_string(),
        platform.to_string(),
        "--tag".to_string(),
        image.to_string(),
        context.to_string(),
    ]
}

/// Builds arguments for `docker push`.
pub fn push_args(image: &str) -> Vec<String> {
    vec!["push".to_string(), image.to_string()]
}

/// Detects the available container runtime.
pub async fn detect_runtime(prefer_podman: bool) -> Result<ContainerRuntime> {
    let check_order = if prefer_podman {
        [ContainerRuntime::Podman, ContainerRuntime::Docker]
    } else {
        [ContainerRuntime::Docker, ContainerRuntime::Podman]
    };

    for runtime in check_order {
        let output = Command::new(runtime_command(runtime))
            .arg("--version")
            .output()
            .await;

        if let Ok(output) = output {
            if output.status.success() {
                return Ok(runtime);
            }
        }
    }

    Err(CliError::ContainerRuntimeNotFound(
        "Neither docker nor podman found in PATH".to_string(),
    ))
}

/// [`ImagePublisher`] pushing to ECR with Docker or Podman.
pub struct RegistryPublisher {
    ecr: aws_sdk_ecr::Client,
    runtime: ContainerRuntime,
}

impl RegistryPublisher {
    pub fn new(sdk_config: &SdkConfig, runtime: ContainerRuntime) -> Self {
        Self {
            ecr: aws_sdk_ecr::Client::new(sdk_config),
            runtime,
        }
    }

    async fn credentials(&self) -> Result<RegistryCredentials> {
        let response = self
            .ecr
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| CliError::AwsSdk(format!("{}", DisplayErrorContext(&e))))?;

        let token = response
            .authorization_data()
            .first()
            .and_then(|data| data.authorization_token())
            .ok_or_else(|| {
                CliError::AwsSdk("registry returned no authorization token".to_string())
            })?;

        decode_registry_token(token)
    }

    async fn login(&self, host: &str, credentials: &RegistryCredentials) -> Result<()> {
        let cmd = runtime_command(self.runtime);
        let mut child = Command::new(cmd)
            .args(login_args(host, &credentials.username))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(credentials.password.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(CliError::ImagePublish(format!(
                "{} login to {} failed: {}",
                cmd,
                host,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn run(&self, args: Vec<String>) -> Result<()> {
        let cmd = runtime_command(self.runtime);
        tracing::debug!(command = cmd, args = ?args, "running container runtime");

        let status = execute_command_streaming(cmd, &args).await?;
        if !status.success() {
            return Err(CliError::ImagePublish(format!(
                "{} {} exited with {}",
                cmd,
                args.first().map(String::as_str).unwrap_or_default(),
                status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ImagePublisher for RegistryPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<()> {
        let image = request.image_reference();
        let host = registry_host(&request.repository_uri);

        let credentials = self.credentials().await?;
        self.login(host, &credentials).await?;
        tracing::info!(registry = host, "logged in to registry");

        let context = stage_build_context(&request.directory, &request.exclude)?;
        let context_path = context.path().to_string_lossy().to_string();

        tracing::info!(image = %image, platform = %request.platform, "building image");
        self.run(build_args(&request.platform, &image, &context_path)).await?;

        tracing::info!(image = %image, "pushing image");
        self.run(push_args(&image)).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_registry_token() {
        let token = base64::engine::general_purpose::STANDARD.encode("AWS:secret:with:colons");
        let credentials = decode_registry_token(&token).unwrap();
        assert_eq!(credentials.username, "AWS");
        assert_eq!(credentials.password, "secret:with:colons");
    }

    #[test]
    fn test_decode_registry_token_rejects_garbage() {
        assert!(decode_registry_token("not base64!").is_err());

        let no_separator = base64::engine::general_purpose::STANDARD.encode("AWS");
        assert!(decode_registry_token(&no_separator).is_err());
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(
            registry_host("123456789012.dkr.ecr.us-east-1.amazonaws.com/cloud-engineer-agent"),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com"
        );
        assert_eq!(registry_host("localhost:5000"), "localhost:5000");
    }

    #[test]
    fn test_login_args_keep_password_off_the_command_line() {
        let args = login_args("registry.example.com", "AWS");
        assert_eq!(
            args,
            vec!["login", "--username", "AWS", "--password-stdin", "registry.example.com"]
        );
    }

    #[test]
    fn test_build_args() {
        let args = build_args("linux/amd64", "repo:latest", "/tmp/ctx");
        assert!(args.windows(2).any(|w| w == ["--platform", "linux/amd64"]));
        assert!(args.windows(2).any(|w| w == ["--tag", "repo:latest"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/ctx"));
        assert_eq!(push_args("repo:latest"), vec!["push", "repo:latest"]);
    }

    #[test]
    fn test_runtime_command() {
        assert_eq!(runtime_command(ContainerRuntime::Docker), "docker");
        assert_eq!(runtime_command(ContainerRuntime::Podman), "podman");
    }
}
