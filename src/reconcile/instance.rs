//! Compute instance reconciliation
//!
//! Identity is the name tag. A located instance that is already
//! running short-circuits everything; one still coming up is waited
//! on, never relaunched. The create path resolves the machine image
//! through the parameter service, launches once, waits for running
//! within the configured bound, then re-reads the instance because the
//! launch response does not carry the assigned address.

use std::time::Duration;

use tracing::info;

use crate::cloud::{Instance, InstanceLaunch, InstanceState};
use crate::resource::{ResourceDescriptor, ResourceKind, ResourceStatus};
use crate::retry::retry_transient;
use crate::{Error, Result};

use super::Context;

/// Find the instance by its name tag
pub async fn locate_instance(ctx: Context<'_>) -> Result<Option<Instance>> {
    retry_transient(ctx.retry, "find_instance", || {
        ctx.cloud.compute.find_instance(&ctx.config.instance_name)
    })
    .await
}

/// Locate-or-create the instance and return it with its address
pub async fn reconcile_instance(ctx: Context<'_>, boundary_id: &str) -> Result<ResourceDescriptor> {
    let name = &ctx.config.instance_name;
    let timeout = Duration::from_secs(ctx.config.readiness_timeout_secs);

    let instance = match locate_instance(ctx).await? {
        Some(existing) => {
            info!(
                kind = "compute-instance",
                name = %name,
                id = %existing.id,
                state = ?existing.state,
                "reused existing"
            );
            if existing.state == InstanceState::Running && existing.private_ip.is_some() {
                existing
            } else {
                // Still coming up from an earlier run; wait it out
                // rather than launching a second copy.
                await_running(ctx, &existing.id, timeout).await?
            }
        }
        None => {
            let image_id = retry_transient(ctx.retry, "get_parameter", || {
                ctx.cloud.parameters.get_parameter(&ctx.config.image_parameter)
            })
            .await?;

            let launch = InstanceLaunch {
                name: name.clone(),
                image_id,
                instance_type: ctx.config.instance_type.clone(),
                subnet_id: ctx.config.subnet_id.clone(),
                boundary_id: boundary_id.to_string(),
                key_pair_name: ctx.config.key_pair_name.clone(),
                user_data: ctx.config.bootstrap_script().to_string(),
            };
            let created = ctx.cloud.compute.create_instance(&launch).await?;
            info!(kind = "compute-instance", name = %name, id = %created.id, "created new");
            await_running(ctx, &created.id, timeout).await?
        }
    };

    let address = instance.private_ip.ok_or_else(|| {
        Error::provider_for(
            "compute-instance",
            format!("running instance {} reports no private address", instance.id),
        )
    })?;

    Ok(
        ResourceDescriptor::new(ResourceKind::ComputeInstance, instance.id)
            .with_status(ResourceStatus::Active)
            .with_address(address),
    )
}

/// Wait for running, then re-read to pick up the assigned address
///
/// The wait itself is not retried; a timeout here is a real failure
/// and the next run resumes from the locate step.
async fn await_running(ctx: Context<'_>, id: &str, timeout: Duration) -> Result<Instance> {
    ctx.cloud.compute.wait_until_running(id, timeout).await?;
    ctx.cloud.compute.describe_instance(id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cloud::{MemoryCloud, MockComputeService, MockParameterService};
    use crate::config::test_config;
    use crate::retry::RetryConfig;

    fn running(id: &str, name: &str, ip: &str) -> Instance {
        Instance {
            id: id.to_string(),
            name: name.to_string(),
            state: InstanceState::Running,
            private_ip: Some(ip.to_string()),
        }
    }

    fn cloud_with(compute: MockComputeService) -> crate::cloud::Cloud {
        let mut cloud = MemoryCloud::new().into_cloud();
        cloud.compute = Arc::new(compute);
        cloud
    }

    #[tokio::test]
    async fn test_running_instance_short_circuits() {
        let mut compute = MockComputeService::new();
        compute
            .expect_find_instance()
            .returning(|name| Ok(Some(running("i-existing", name, "10.0.1.5"))));
        compute.expect_create_instance().times(0);
        compute.expect_wait_until_running().times(0);

        let cloud = cloud_with(compute);
        let config = test_config();
        let retry = RetryConfig::immediate(2);
        let ctx = Context {
            cloud: &cloud,
            config: &config,
            retry: &retry,
        };

        let descriptor = reconcile_instance(ctx, "sb-1").await.unwrap();
        assert_eq!(descriptor.id, "i-existing");
        assert_eq!(descriptor.address.as_deref(), Some("10.0.1.5"));
    }

    #[tokio::test]
    async fn test_pending_instance_is_waited_on_not_relaunched() {
        let mut compute = MockComputeService::new();
        compute.expect_find_instance().returning(|name| {
            Ok(Some(Instance {
                id: "i-pending".to_string(),
                name: name.to_string(),
                state: InstanceState::Pending,
                private_ip: None,
            }))
        });
        compute.expect_create_instance().times(0);
        compute
            .expect_wait_until_running()
            .times(1)
            .returning(|_, _| Ok(()));
        compute
            .expect_describe_instance()
            .times(1)
            .returning(|id| Ok(running(id, "render-proxy", "10.0.1.5")));

        let cloud = cloud_with(compute);
        let config = test_config();
        let retry = RetryConfig::immediate(2);
        let ctx = Context {
            cloud: &cloud,
            config: &config,
            retry: &retry,
        };

        let descriptor = reconcile_instance(ctx, "sb-1").await.unwrap();
        assert_eq!(descriptor.address.as_deref(), Some("10.0.1.5"));
    }

    #[tokio::test]
    async fn test_absent_instance_is_launched_once() {
        let mut compute = MockComputeService::new();
        compute.expect_find_instance().returning(|_| Ok(None));
        compute
            .expect_create_instance()
            .times(1)
            .withf(|launch| {
                launch.image_id == "ami-resolved"
                    && launch.boundary_id == "sb-1"
                    && launch.user_data.contains("GatewayPorts")
            })
            .returning(|launch| {
                Ok(Instance {
                    id: "i-1".to_string(),
                    name: launch.name.clone(),
                    state: InstanceState::Pending,
                    private_ip: None,
                })
            });
        compute
            .expect_wait_until_running()
            .times(1)
            .returning(|_, _| Ok(()));
        compute
            .expect_describe_instance()
            .times(1)
            .returning(|id| Ok(running(id, "render-proxy", "10.0.1.5")));

        let mut parameters = MockParameterService::new();
        parameters
            .expect_get_parameter()
            .returning(|_| Ok("ami-resolved".to_string()));

        let mut cloud = MemoryCloud::new().into_cloud();
        cloud.compute = Arc::new(compute);
        cloud.parameters = Arc::new(parameters);
        let config = test_config();
        let retry = RetryConfig::immediate(2);
        let ctx = Context {
            cloud: &cloud,
            config: &config,
            retry: &retry,
        };

        let descriptor = reconcile_instance(ctx, "sb-1").await.unwrap();
        assert_eq!(descriptor.id, "i-1");
        assert_eq!(descriptor.status, ResourceStatus::Active);
    }

    #[tokio::test]
    async fn test_readiness_timeout_is_fatal_and_not_retried() {
        let mut compute = MockComputeService::new();
        compute.expect_find_instance().returning(|_| Ok(None));
        compute.expect_create_instance().times(1).returning(|launch| {
            Ok(Instance {
                id: "i-1".to_string(),
                name: launch.name.clone(),
                state: InstanceState::Pending,
                private_ip: None,
            })
        });
        compute
            .expect_wait_until_running()
            .times(1)
            .returning(|id, timeout| Err(Error::readiness_timeout(id, timeout.as_secs())));
        compute.expect_describe_instance().times(0);

        let mut parameters = MockParameterService::new();
        parameters
            .expect_get_parameter()
            .returning(|_| Ok("ami-resolved".to_string()));

        let mut cloud = MemoryCloud::new().into_cloud();
        cloud.compute = Arc::new(compute);
        cloud.parameters = Arc::new(parameters);
        let config = test_config();
        let retry = RetryConfig::immediate(3);
        let ctx = Context {
            cloud: &cloud,
            config: &config,
            retry: &retry,
        };

        let err = reconcile_instance(ctx, "sb-1").await.unwrap_err();
        assert!(matches!(err, Error::ReadinessTimeout { .. }));
    }
}
