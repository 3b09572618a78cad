use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ecr::Client as EcrClient;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info};

use super::{CreateRepositoryError, RegistryControl, RegistryLogin, RepositoryPage};

/// Reduce an AWS SDK error to the service's message
///
/// ECR service errors carry their text in an `ErrorMetadata` whose Debug
/// output contains `message: Some("...")`. Transport errors have no such
/// field and are shortened instead.
fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    const MESSAGE_FIELD: &str = "message: Some(\"";
    const MAX_LEN: usize = 200;

    let debug_str = format!("{:?}", err);

    if let Some(start) = debug_str.find(MESSAGE_FIELD) {
        let rest = &debug_str[start + MESSAGE_FIELD.len()..];
        if let Some(end) = rest.find("\")") {
            return rest[..end].to_string();
        }
    }

    if debug_str.len() <= MAX_LEN {
        return debug_str;
    }
    let mut end = MAX_LEN;
    while !debug_str.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &debug_str[..end])
}

/// Decode an ECR authorization token into a username/password pair
fn decode_authorization_token(token: &str) -> Result<(String, String)> {
    let decoded = STANDARD
        .decode(token)
        .context("ECR authorization token is not valid base64")?;
    let decoded =
        String::from_utf8(decoded).context("ECR authorization token is not valid UTF-8")?;

    match decoded.split_once(':') {
        Some((username, password)) => Ok((username.to_string(), password.to_string())),
        None => bail!("ECR authorization token is not in 'user:password' format"),
    }
}

/// ECR-backed implementation of the registry control API
///
/// Credentials and (unless given explicitly) the region come from the AWS SDK
/// default configuration chain: environment variables, shared profiles,
/// container and instance metadata.
pub struct EcrRepoManager {
    ecr_client: EcrClient,
    region: Option<String>,
}

impl EcrRepoManager {
    /// Create a new ECR client, optionally pinned to a region
    pub async fn new(region: Option<String>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let aws_config = loader.load().await;

        let region = aws_config.region().map(|r| r.to_string());
        debug!("ECR client configured for region {:?}", region);

        Ok(Self {
            ecr_client: EcrClient::new(&aws_config),
            region,
        })
    }

    /// Region resolved by the SDK, if any
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

#[async_trait]
impl RegistryControl for EcrRepoManager {
    async fn describe_repositories(
        &self,
        registry_id: &str,
        next_token: Option<String>,
    ) -> Result<RepositoryPage> {
        let response = self
            .ecr_client
            .describe_repositories()
            .registry_id(registry_id)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to list ECR repositories in registry {}: {}",
                    registry_id,
                    format_sdk_error(&e)
                )
            })?;

        let names = response
            .repositories()
            .iter()
            .filter_map(|repo| repo.repository_name())
            .map(String::from)
            .collect();

        Ok(RepositoryPage {
            names,
            next_token: response.next_token().map(String::from),
        })
    }

    async fn create_repository(
        &self,
        registry_id: &str,
        name: &str,
    ) -> Result<(), CreateRepositoryError> {
        info!("Creating ECR repository: {}", name);

        match self
            .ecr_client
            .create_repository()
            .registry_id(registry_id)
            .repository_name(name)
            .send()
            .await
        {
            Ok(_) => {
                info!("Created ECR repository: {}", name);
                Ok(())
            }
            Err(err) => {
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_repository_already_exists_exception() {
                        return Err(CreateRepositoryError::AlreadyExists(name.to_string()));
                    }
                }
                Err(CreateRepositoryError::Other(anyhow::anyhow!(
                    "Failed to create ECR repository '{}': {}",
                    name,
                    format_sdk_error(&err)
                )))
            }
        }
    }

    async fn authorization_token(&self, registry_id: &str) -> Result<RegistryLogin> {
        #[allow(deprecated)]
        let response = self
            .ecr_client
            .get_authorization_token()
            .registry_ids(registry_id)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to get ECR authorization token for registry {}: {}",
                    registry_id,
                    format_sdk_error(&e)
                )
            })?;

        let data = response
            .authorization_data()
            .first()
            .context("ECR returned no authorization data")?;
        let token = data
            .authorization_token()
            .context("ECR authorization data has no token")?;
        let endpoint = data
            .proxy_endpoint()
            .context("ECR authorization data has no proxy endpoint")?;

        let (username, password) = decode_authorization_token(token)?;

        Ok(RegistryLogin {
            endpoint: endpoint.to_string(),
            username,
            password,
        })
    }
}
