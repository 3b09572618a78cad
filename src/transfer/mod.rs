// Container transfer client - pulling from the source registry and pushing to ECR

mod container_cli;

pub use container_cli::ContainerCli;

use anyhow::Result;
use async_trait::async_trait;

use crate::ecr::RegistryLogin;

/// An image available to the transfer client after a pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    /// Reference the image was pulled by
    pub reference: String,
}

/// Trait for moving images between registries
#[async_trait]
pub trait ImageTransfer: Send + Sync {
    /// Pull an image from the source registry
    async fn pull(&self, source: &str) -> Result<LocalImage>;

    /// Push a pulled image to a fully-qualified destination reference
    async fn push(&self, image: &LocalImage, destination: &str) -> Result<()>;

    /// Authenticate against a registry before pushing
    async fn login(&self, login: &RegistryLogin) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every transfer operation in call order
    #[derive(Default)]
    pub struct RecordingTransfer {
        pub calls: Mutex<Vec<String>>,
        pub failing_pulls: HashSet<String>,
        pub failing_pushes: HashSet<String>,
    }

    impl RecordingTransfer {
        pub fn failing_pull(source: &str) -> Self {
            Self {
                failing_pulls: [source.to_string()].into_iter().collect(),
                ..Default::default()
            }
        }

        pub fn failing_push(destination: &str) -> Self {
            Self {
                failing_pushes: [destination.to_string()].into_iter().collect(),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageTransfer for RecordingTransfer {
        async fn pull(&self, source: &str) -> Result<LocalImage> {
            self.calls.lock().unwrap().push(format!("pull {}", source));
            if self.failing_pulls.contains(source) {
                anyhow::bail!("manifest for {} not found", source);
            }
            Ok(LocalImage {
                reference: source.to_string(),
            })
        }

        async fn push(&self, image: &LocalImage, destination: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("push {} {}", image.reference, destination));
            if self.failing_pushes.contains(destination) {
                anyhow::bail!("denied: not authorized to push to {}", destination);
            }
            Ok(())
        }

        async fn login(&self, login: &RegistryLogin) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("login {} {}", login.endpoint, login.username));
            Ok(())
        }
    }
}
