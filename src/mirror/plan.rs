use std::collections::BTreeSet;
use std::fmt;

use super::image::{destination_reference, ImageTag};

/// A single pull + push pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub source: String,
    pub destination: String,
}

/// What a mirror run is going to do, computed before anything is changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPlan {
    /// Number of repositories already present in the destination registry
    pub existing_count: usize,
    /// Repositories to create, sorted by name
    pub missing: BTreeSet<String>,
    /// Transfers in input order
    pub transfers: Vec<Transfer>,
}

/// Repositories implied by `requested` that are not in `existing`
pub fn missing_repositories(
    requested: &[ImageTag],
    existing: &BTreeSet<String>,
) -> BTreeSet<String> {
    requested
        .iter()
        .map(|image| image.repository.as_str())
        .filter(|name| !existing.contains(*name))
        .map(String::from)
        .collect()
}

impl MirrorPlan {
    pub fn build(
        account_id: &str,
        region: &str,
        requested: &[ImageTag],
        existing: &BTreeSet<String>,
    ) -> Self {
        let transfers = requested
            .iter()
            .map(|image| Transfer {
                source: image.source_reference(),
                destination: destination_reference(account_id, region, image),
            })
            .collect();

        Self {
            existing_count: existing.len(),
            missing: missing_repositories(requested, existing),
            transfers,
        }
    }
}

impl fmt::Display for MirrorPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Existing repositories: {}", self.existing_count)?;
        if self.missing.is_empty() {
            writeln!(f, "Repositories to create: none")?;
        } else {
            writeln!(f, "Repositories to create:")?;
            for name in &self.missing {
                writeln!(f, "  + {}", name)?;
            }
        }
        writeln!(f, "Images to mirror:")?;
        for transfer in &self.transfers {
            writeln!(f, "  {} -> {}", transfer.source, transfer.destination)?;
        }
        Ok(())
    }
}
