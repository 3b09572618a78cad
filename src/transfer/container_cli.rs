// Image transfer through the docker (or podman) command line

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ImageTransfer, LocalImage};
use crate::ecr::RegistryLogin;

/// Transfers images with a local container CLI
///
/// Registry credentials are whatever the CLI already has stored, unless
/// `login` is called first.
pub struct ContainerCli {
    container_cli: String,
}

impl ContainerCli {
    pub fn new(container_cli: impl Into<String>) -> Self {
        Self {
            container_cli: container_cli.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let mut cmd = Command::new(&self.container_cli);
        cmd.args(args);

        debug!("Executing command: {:?}", cmd);

        let status = cmd.status().await.with_context(|| {
            format!(
                "Failed to execute {} {}. Is Docker or Podman installed?",
                self.container_cli, args[0]
            )
        })?;

        if !status.success() {
            bail!(
                "{} {} failed with status: {}",
                self.container_cli,
                args[0],
                status
            );
        }

        Ok(())
    }
}

#[async_trait]
impl ImageTransfer for ContainerCli {
    async fn pull(&self, source: &str) -> Result<LocalImage> {
        info!("Pulling image: {}", source);
        self.run(&["pull", source]).await?;

        Ok(LocalImage {
            reference: source.to_string(),
        })
    }

    async fn push(&self, image: &LocalImage, destination: &str) -> Result<()> {
        self.run(&["tag", image.reference.as_str(), destination]).await?;

        info!("Pushing image to registry: {}", destination);
        self.run(&["push", destination]).await
    }

    async fn login(&self, login: &RegistryLogin) -> Result<()> {
        debug!(
            "Executing: {} login {} --username {} --password-stdin",
            self.container_cli, login.endpoint, login.username
        );

        let mut child = Command::new(&self.container_cli)
            .arg("login")
            .arg(&login.endpoint)
            .arg("--username")
            .arg(&login.username)
            .arg("--password-stdin")
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {} login", self.container_cli))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(login.password.as_bytes())
                .await
                .with_context(|| format!("Failed to pass password to {} login", self.container_cli))?;
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to execute {} login", self.container_cli))?;

        if !status.success() {
            bail!("{} login failed with status: {}", self.container_cli, status);
        }

        info!("Logged in to registry: {}", login.endpoint);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pull_and_push_succeed_when_cli_succeeds() {
        let cli = ContainerCli::new("true");
        let image = cli.pull("alpine:3.18").await.unwrap();
        assert_eq!(image.reference, "alpine:3.18");
        cli.push(&image, "123456789012.dkr.ecr.us-east-1.amazonaws.com/alpine:3.18")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_command_reports_status() {
        let cli = ContainerCli::new("false");
        let err = cli.pull("alpine:3.18").await.unwrap_err();
        assert!(err.to_string().contains("false pull failed with status"));
    }

    #[tokio::test]
    async fn test_missing_cli_is_an_error() {
        let cli = ContainerCli::new("definitely-not-a-container-cli");
        let err = cli.pull("alpine:3.18").await.unwrap_err();
        assert!(err
            .to_string()
            .contains("Failed to execute definitely-not-a-container-cli pull"));
    }
}
