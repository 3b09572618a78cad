// Registry control API - listing and creating destination repositories

mod manager;

pub use manager::EcrRepoManager;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

/// One page of a repository listing
#[derive(Debug, Clone, Default)]
pub struct RepositoryPage {
    pub names: Vec<String>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Credentials for logging a container CLI into the registry
#[derive(Clone)]
pub struct RegistryLogin {
    /// Registry endpoint (e.g. "https://123456789012.dkr.ecr.eu-west-1.amazonaws.com")
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for RegistryLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryLogin")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateRepositoryError {
    /// Someone else created the repository first
    #[error("repository '{0}' already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Trait for the destination registry's control API
#[async_trait]
pub trait RegistryControl: Send + Sync {
    /// Fetch a single page of repositories in the registry
    async fn describe_repositories(
        &self,
        registry_id: &str,
        next_token: Option<String>,
    ) -> Result<RepositoryPage>;

    /// Create a repository in the registry
    async fn create_repository(
        &self,
        registry_id: &str,
        name: &str,
    ) -> Result<(), CreateRepositoryError>;

    /// Get short-lived credentials for pushing to the registry
    async fn authorization_token(&self, registry_id: &str) -> Result<RegistryLogin>;
}

/// Names of all repositories in the registry, across every page of the listing
pub async fn list_repository_names(
    control: &dyn RegistryControl,
    registry_id: &str,
) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = control
            .describe_repositories(registry_id, next_token.take())
            .await?;
        pages += 1;
        names.extend(page.names);

        next_token = page.next_token;
        if next_token.is_none() {
            break;
        }
    }

    debug!(
        registry_id,
        pages,
        repositories = names.len(),
        "Listed existing repositories"
    );
    Ok(names)
}
