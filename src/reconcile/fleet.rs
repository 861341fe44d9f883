//! Fleet attachment reconciliation
//!
//! Trailing optional node: reads the fleet's current resource list and
//! adds the configuration ARN if it is missing. Existing attachments
//! are preserved. The engine treats a failure here as non-fatal; the
//! chain itself is already converged.

use tracing::info;

use crate::resource::{ResourceDescriptor, ResourceKind, ResourceStatus};
use crate::retry::retry_transient;
use crate::{Error, Result};

use super::Context;

/// Attach the configuration to the configured fleet if not already attached
pub async fn reconcile_fleet_attachment(
    ctx: Context<'_>,
    configuration_arn: &str,
) -> Result<ResourceDescriptor> {
    let target = ctx
        .config
        .fleet
        .as_ref()
        .ok_or_else(|| Error::validation("fleet node requires a fleet target to be set"))?;

    let current = retry_transient(ctx.retry, "get_fleet", || {
        ctx.cloud.fleet.get_fleet(&target.farm_id, &target.fleet_id)
    })
    .await?;

    if current
        .resource_arns
        .iter()
        .any(|arn| arn == configuration_arn)
    {
        info!(
            kind = "fleet-attachment",
            fleet = %target.fleet_id,
            "configuration already attached"
        );
    } else {
        let mut updated = current;
        updated.resource_arns.push(configuration_arn.to_string());
        ctx.cloud
            .fleet
            .update_fleet(&target.farm_id, &target.fleet_id, &updated)
            .await?;
        info!(
            kind = "fleet-attachment",
            fleet = %target.fleet_id,
            total = updated.resource_arns.len(),
            "attached configuration to fleet"
        );
    }

    Ok(
        ResourceDescriptor::new(ResourceKind::FleetAttachment, target.fleet_id.clone())
            .with_status(ResourceStatus::Active),
    )
}
