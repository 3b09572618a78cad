// Mirror orchestration
//
// Lists the destination registry's repositories, creates the missing ones and
// copies every requested image from the source registry into the destination.

mod image;
mod plan;

pub use image::ImageTag;
pub use plan::{MirrorPlan, Transfer};

use anyhow::{Context, Result};
use futures::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ecr::{list_repository_names, CreateRepositoryError, RegistryControl};
use crate::report::Reporter;
use crate::transfer::ImageTransfer;

/// Validated inputs of a mirror run
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub account_id: String,
    pub region: String,
    pub image_tags: Vec<ImageTag>,
    /// Maximum number of pull + push pairs in flight (1 = sequential)
    pub concurrency: usize,
    /// Log the container CLI into the registry before pushing
    pub login: bool,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorSummary {
    /// Repositories created by this run
    pub created: Vec<String>,
    /// Destination references pushed, in input order
    pub mirrored: Vec<String>,
}

pub struct Mirror {
    config: MirrorConfig,
    registry: Arc<dyn RegistryControl>,
    transfer: Arc<dyn ImageTransfer>,
    reporter: Arc<dyn Reporter>,
}

impl Mirror {
    pub fn new(
        config: MirrorConfig,
        registry: Arc<dyn RegistryControl>,
        transfer: Arc<dyn ImageTransfer>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config,
            registry,
            transfer,
            reporter,
        }
    }

    /// Compute what a run would do without changing anything
    pub async fn plan(&self) -> Result<MirrorPlan> {
        let existing = list_repository_names(self.registry.as_ref(), &self.config.account_id)
            .await
            .context("Failed to discover existing ECR repositories")?;

        let plan = MirrorPlan::build(
            &self.config.account_id,
            &self.config.region,
            &self.config.image_tags,
            &existing,
        );
        debug!(
            existing = plan.existing_count,
            missing = plan.missing.len(),
            transfers = plan.transfers.len(),
            "Computed mirror plan"
        );
        Ok(plan)
    }

    /// Create missing repositories, then pull and push every image
    ///
    /// Stops at the first failure. Repositories and images handled before the
    /// failure stay in place; running again picks up where this run stopped.
    pub async fn run(&self) -> Result<MirrorSummary> {
        self.reporter.progress("Creating all ECR repositories...");
        let plan = self.plan().await?;

        let mut summary = MirrorSummary::default();
        for name in &plan.missing {
            if self.create_repository(name).await? {
                summary.created.push(name.clone());
            }
        }

        if self.config.login {
            self.login().await?;
        }

        summary.mirrored = self.transfer_all(&plan.transfers).await?;

        info!(
            created = summary.created.len(),
            mirrored = summary.mirrored.len(),
            "Mirror run complete"
        );
        Ok(summary)
    }

    /// Returns false if the repository turned out to exist already
    async fn create_repository(&self, name: &str) -> Result<bool> {
        match self
            .registry
            .create_repository(&self.config.account_id, name)
            .await
        {
            Ok(()) => Ok(true),
            Err(CreateRepositoryError::AlreadyExists(_)) => {
                warn!("ECR repository {} already exists, skipping creation", name);
                Ok(false)
            }
            Err(CreateRepositoryError::Other(err)) => {
                Err(err.context(format!("Failed to create repository '{}'", name)))
            }
        }
    }

    async fn login(&self) -> Result<()> {
        let login = self
            .registry
            .authorization_token(&self.config.account_id)
            .await?;
        self.reporter
            .progress(&format!("Logging in to {}", login.endpoint));
        self.transfer.login(&login).await
    }

    async fn transfer_all(&self, transfers: &[Transfer]) -> Result<Vec<String>> {
        if self.config.concurrency <= 1 {
            let mut mirrored = Vec::with_capacity(transfers.len());
            for transfer in transfers {
                mirrored.push(self.transfer_one(transfer).await?);
            }
            return Ok(mirrored);
        }

        // Transfers start in input order; the first error drops the rest
        stream::iter(transfers)
            .map(|transfer| self.transfer_one(transfer))
            .buffered(self.config.concurrency)
            .try_collect()
            .await
    }

    async fn transfer_one(&self, transfer: &Transfer) -> Result<String> {
        self.reporter.progress(&format!(
            "Mirroring {} to {}",
            transfer.source, transfer.destination
        ));

        let image = self
            .transfer
            .pull(&transfer.source)
            .await
            .with_context(|| format!("Failed to pull {}", transfer.source))?;
        self.transfer
            .push(&image, &transfer.destination)
            .await
            .with_context(|| {
                format!(
                    "Failed to push {} to {}",
                    transfer.source, transfer.destination
                )
            })?;

        Ok(transfer.destination.clone())
    }
}
