//! Image registry reconciliation
//!
//! Optional leading node: reconciled only when a repository name is
//! configured. The repository URI lands in the descriptor's address
//! field for the output manifest.

use tracing::info;

use crate::cloud::Repository;
use crate::resource::{ResourceDescriptor, ResourceKind, ResourceStatus};
use crate::retry::retry_transient;
use crate::{Error, Result};

use super::Context;

/// Find the repository by name, if one is configured
pub async fn locate_repository(ctx: Context<'_>) -> Result<Option<Repository>> {
    let name = registry_name(ctx)?;
    retry_transient(ctx.retry, "find_repository", || {
        ctx.cloud.registry.find_repository(name)
    })
    .await
}

/// Locate-or-create the image repository
pub async fn reconcile_registry(ctx: Context<'_>) -> Result<ResourceDescriptor> {
    let name = registry_name(ctx)?;

    let repository = match locate_repository(ctx).await? {
        Some(existing) => {
            info!(kind = "image-registry", name = %name, uri = %existing.uri, "reused existing");
            existing
        }
        None => {
            let created = ctx.cloud.registry.create_repository(name).await?;
            info!(kind = "image-registry", name = %name, uri = %created.uri, "created new");
            created
        }
    };

    Ok(
        ResourceDescriptor::new(ResourceKind::ImageRegistry, repository.name)
            .with_arn(repository.arn)
            .with_status(ResourceStatus::Active)
            .with_address(repository.uri),
    )
}

fn registry_name(ctx: Context<'_>) -> Result<&str> {
    ctx.config
        .registry_name
        .as_deref()
        .ok_or_else(|| Error::validation("registry node requires registry_name to be set"))
}
