//! Sharing grant reconciliation
//!
//! The grant is the one node where a located parent does not end the
//! work: the configuration must be associated with the share whether
//! the share was just created or found from an earlier run.
//! Associations are only ever added, never removed, so resources
//! shared by other tooling survive a convergence run.

use tracing::{debug, info};

use crate::cloud::{Share, ShareSpec};
use crate::resource::{ResourceDescriptor, ResourceKind, ResourceStatus};
use crate::retry::retry_transient;
use crate::{Error, Result};

use super::Context;

/// Find the active share by name
///
/// Deleted shares linger in listings under a terminal status; only an
/// active share counts as a match.
pub async fn locate_share(ctx: Context<'_>) -> Result<Option<Share>> {
    let shares = retry_transient(ctx.retry, "list_shares", || ctx.cloud.sharing.list_shares())
        .await?;
    Ok(shares
        .into_iter()
        .find(|s| s.name == ctx.config.share_name && s.status == "ACTIVE"))
}

/// Locate-or-create the share and converge the resource association
pub async fn reconcile_share(
    ctx: Context<'_>,
    configuration_arn: &str,
) -> Result<ResourceDescriptor> {
    let name = &ctx.config.share_name;

    let share = match locate_share(ctx).await? {
        Some(existing) => {
            info!(kind = "sharing-grant", name = %name, id = %existing.id, "reused existing");
            ensure_resource_associated(ctx, &existing.arn, configuration_arn).await?;
            existing
        }
        None => {
            let spec = ShareSpec {
                name: name.clone(),
                resource_arn: configuration_arn.to_string(),
                allow_external_principals: true,
            };
            let created = ctx.cloud.sharing.create_share(&spec).await?;
            info!(kind = "sharing-grant", name = %name, id = %created.id, "created new");

            let account = retry_transient(ctx.retry, "caller_account", || {
                ctx.cloud.sharing.caller_account()
            })
            .await?;
            // TODO: if a run dies between create_share and this call,
            // the reused-share path never associates the principal.
            // Needs a list_principals operation on SharingService to
            // make this step re-checkable.
            ctx.cloud
                .sharing
                .associate_principal(&created.arn, &ctx.config.share_principal, &account)
                .await?;
            info!(
                principal = %ctx.config.share_principal,
                account = %account,
                "associated service principal"
            );
            created
        }
    };

    Ok(ResourceDescriptor::new(ResourceKind::SharingGrant, share.id)
        .with_arn(share.arn)
        .with_status(ResourceStatus::Active))
}

/// Associate the configuration with a reused share if it is missing
async fn ensure_resource_associated(
    ctx: Context<'_>,
    share_arn: &str,
    resource_arn: &str,
) -> Result<()> {
    let associated = retry_transient(ctx.retry, "list_associated_resources", || {
        ctx.cloud.sharing.list_associated_resources(share_arn)
    })
    .await?;

    if associated.iter().any(|arn| arn == resource_arn) {
        debug!(resource = %resource_arn, "configuration already associated");
        return Ok(());
    }

    match ctx
        .cloud
        .sharing
        .associate_resource(share_arn, resource_arn)
        .await
    {
        Ok(()) => {
            info!(resource = %resource_arn, "associated configuration with share");
            Ok(())
        }
        // Raced with another run; the desired state holds either way.
        Err(Error::Duplicate { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cloud::{MemoryCloud, ShareSpec};
    use crate::cloud::SharingService;
    use crate::config::test_config;
    use crate::retry::RetryConfig;

    const CFG_ARN: &str = "arn:memory:configuration/cfg-1";

    #[tokio::test]
    async fn test_created_share_carries_resource_and_principal() {
        let memory = MemoryCloud::new();
        let cloud = memory.clone().into_cloud();
        let config = test_config();
        let retry = RetryConfig::immediate(2);
        let ctx = Context {
            cloud: &cloud,
            config: &config,
            retry: &retry,
        };

        let descriptor = reconcile_share(ctx, CFG_ARN).await.unwrap();
        assert_eq!(descriptor.kind, ResourceKind::SharingGrant);

        let share_arn = descriptor.arn.as_str();
        assert_eq!(memory.share_resource_arns(share_arn), vec![CFG_ARN]);
        assert_eq!(
            memory.share_principals(share_arn),
            vec![(
                "fleets.deadline.amazonaws.com".to_string(),
                "123456789012".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_reused_share_gains_missing_association_only() {
        let memory = MemoryCloud::new();
        // A share from some earlier tooling, holding an unrelated resource.
        memory
            .create_share(&ShareSpec {
                name: "render-proxy-share".to_string(),
                resource_arn: "arn:memory:configuration/cfg-other".to_string(),
                allow_external_principals: true,
            })
            .await
            .unwrap();
        let baseline_creates = memory.total_create_calls();

        let cloud = memory.clone().into_cloud();
        let config = test_config();
        let retry = RetryConfig::immediate(2);
        let ctx = Context {
            cloud: &cloud,
            config: &config,
            retry: &retry,
        };

        let descriptor = reconcile_share(ctx, CFG_ARN).await.unwrap();
        assert_eq!(memory.total_create_calls(), baseline_creates);

        // Monotonic: the pre-existing association survives, ours is added.
        let share_arn = descriptor.arn.as_str();
        let arns = memory.share_resource_arns(share_arn);
        assert_eq!(arns.len(), 2);
        assert!(arns.iter().any(|a| a == CFG_ARN));
        assert!(arns.iter().any(|a| a == "arn:memory:configuration/cfg-other"));

        // The reuse path does not touch principals.
        assert!(memory.share_principals(share_arn).is_empty());
    }

    #[tokio::test]
    async fn test_repeat_run_adds_nothing() {
        let memory = MemoryCloud::new();
        let cloud = memory.clone().into_cloud();
        let config = test_config();
        let retry = RetryConfig::immediate(2);
        let ctx = Context {
            cloud: &cloud,
            config: &config,
            retry: &retry,
        };

        let first = reconcile_share(ctx, CFG_ARN).await.unwrap();
        let second = reconcile_share(ctx, CFG_ARN).await.unwrap();
        assert_eq!(first.id, second.id);

        let share_arn = first.arn.as_str();
        assert_eq!(memory.share_resource_arns(share_arn), vec![CFG_ARN]);
        assert_eq!(memory.share_principals(share_arn).len(), 1);
    }
}
