//! Security boundary reconciliation
//!
//! Locates or creates the security group, then reconciles its ingress
//! rule set: one rule per configured port from the network CIDR and,
//! when the region publishes one, from the exposure service's managed
//! prefix list. Duplicate-rule rejections are success; the rule is
//! already in the desired state.

use tracing::{debug, info};

use crate::cloud::{Boundary, IngressRule, RuleSource};
use crate::resource::{ResourceDescriptor, ResourceKind, ResourceStatus};
use crate::retry::retry_transient;
use crate::{Error, Result};

use super::Context;

/// Find the boundary by name within the configured network
pub async fn locate_boundary(ctx: Context<'_>) -> Result<Option<Boundary>> {
    retry_transient(ctx.retry, "find_boundary", || {
        ctx.cloud
            .compute
            .find_boundary(&ctx.config.boundary_name, &ctx.config.vpc_id)
    })
    .await
}

/// Locate-or-create the boundary and converge its rule set
pub async fn reconcile_boundary(ctx: Context<'_>) -> Result<ResourceDescriptor> {
    let name = &ctx.config.boundary_name;

    let boundary = match locate_boundary(ctx).await? {
        Some(existing) => {
            info!(kind = "security-boundary", name = %name, id = %existing.id, "reused existing");
            existing
        }
        None => {
            let created = ctx
                .cloud
                .compute
                .create_boundary(
                    name,
                    &ctx.config.vpc_id,
                    "render proxy access from the network and the exposure service",
                )
                .await?;
            info!(kind = "security-boundary", name = %name, id = %created.id, "created new");
            created
        }
    };

    // Rules are reconciled on every run, reused boundary or not, so a
    // port added to the config converges on the next run.
    ensure_rules(ctx, &boundary.id).await?;

    Ok(
        ResourceDescriptor::new(ResourceKind::SecurityBoundary, boundary.id)
            .with_status(ResourceStatus::Active),
    )
}

/// Add every configured port rule, tolerating already-present rules
async fn ensure_rules(ctx: Context<'_>, boundary_id: &str) -> Result<()> {
    let cidr = retry_transient(ctx.retry, "vpc_cidr", || {
        ctx.cloud.network.vpc_cidr(&ctx.config.vpc_id)
    })
    .await?;
    let prefix_list = retry_transient(ctx.retry, "service_prefix_list", || {
        ctx.cloud.network.service_prefix_list()
    })
    .await?;

    for &port in &ctx.config.ports {
        add_rule_tolerant(
            ctx,
            boundary_id,
            &IngressRule::tcp(port, RuleSource::Cidr(cidr.clone())),
        )
        .await?;

        if let Some(ref prefix_list_id) = prefix_list {
            add_rule_tolerant(
                ctx,
                boundary_id,
                &IngressRule::tcp(port, RuleSource::PrefixList(prefix_list_id.clone())),
            )
            .await?;
        }
    }

    Ok(())
}

/// Issue one rule add; a duplicate rejection reconciles to success
async fn add_rule_tolerant(
    ctx: Context<'_>,
    boundary_id: &str,
    rule: &IngressRule,
) -> Result<()> {
    match ctx.cloud.network.add_rule(boundary_id, rule).await {
        Ok(()) => {
            info!(port = rule.port, source = %rule.source, "added ingress rule");
            Ok(())
        }
        Err(Error::Duplicate { .. }) => {
            debug!(port = rule.port, source = %rule.source, "ingress rule already present");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
