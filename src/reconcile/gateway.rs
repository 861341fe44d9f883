//! Exposure gateway and configuration reconciliation
//!
//! The provider offers no server-side name filter for either kind, so
//! both locators drain the full listing and match client-side. The
//! configuration targets the instance's assigned address and must not
//! be created before that address exists.

use tracing::info;

use crate::cloud::{ConfigurationSpec, Gateway, GatewayConfiguration, GatewaySpec};
use crate::resource::{ResourceDescriptor, ResourceKind, ResourceStatus};
use crate::retry::retry_transient;
use crate::Result;

use super::Context;

/// Find the gateway by name
pub async fn locate_gateway(ctx: Context<'_>) -> Result<Option<Gateway>> {
    let gateways = retry_transient(ctx.retry, "list_gateways", || {
        ctx.cloud.gateway.list_gateways()
    })
    .await?;
    Ok(gateways
        .into_iter()
        .find(|g| g.name == ctx.config.gateway_name))
}

/// Find the configuration by name
pub async fn locate_configuration(ctx: Context<'_>) -> Result<Option<GatewayConfiguration>> {
    let configurations = retry_transient(ctx.retry, "list_configurations", || {
        ctx.cloud.gateway.list_configurations()
    })
    .await?;
    Ok(configurations
        .into_iter()
        .find(|c| c.name == ctx.config.configuration_name))
}

/// Locate-or-create the exposure gateway
pub async fn reconcile_gateway(ctx: Context<'_>, boundary_id: &str) -> Result<ResourceDescriptor> {
    let name = &ctx.config.gateway_name;

    let gateway = match locate_gateway(ctx).await? {
        Some(existing) => {
            info!(kind = "exposure-gateway", name = %name, id = %existing.id, "reused existing");
            existing
        }
        None => {
            let spec = GatewaySpec {
                name: name.clone(),
                vpc_id: ctx.config.vpc_id.clone(),
                subnet_id: ctx.config.subnet_id.clone(),
                boundary_id: boundary_id.to_string(),
            };
            let created = ctx.cloud.gateway.create_gateway(&spec).await?;
            info!(kind = "exposure-gateway", name = %name, id = %created.id, "created new");
            created
        }
    };

    Ok(
        ResourceDescriptor::new(ResourceKind::ExposureGateway, gateway.id)
            .with_arn(gateway.arn)
            .with_status(ResourceStatus::Active),
    )
}

/// Locate-or-create the exposure configuration targeting one address
pub async fn reconcile_configuration(
    ctx: Context<'_>,
    gateway_id: &str,
    target_address: &str,
) -> Result<ResourceDescriptor> {
    let name = &ctx.config.configuration_name;

    let configuration = match locate_configuration(ctx).await? {
        Some(existing) => {
            info!(
                kind = "exposure-configuration",
                name = %name,
                id = %existing.id,
                target = %existing.target_address,
                "reused existing"
            );
            existing
        }
        None => {
            let spec = ConfigurationSpec {
                name: name.clone(),
                gateway_id: gateway_id.to_string(),
                target_address: target_address.to_string(),
                port: ctx.config.exposed_port,
            };
            let created = ctx.cloud.gateway.create_configuration(&spec).await?;
            info!(
                kind = "exposure-configuration",
                name = %name,
                id = %created.id,
                target = %created.target_address,
                port = created.port,
                "created new"
            );
            created
        }
    };

    Ok(
        ResourceDescriptor::new(ResourceKind::ExposureConfiguration, configuration.id)
            .with_arn(configuration.arn)
            .with_status(ResourceStatus::Active)
            .with_address(configuration.target_address)
            .with_port(configuration.port),
    )
}
