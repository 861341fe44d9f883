//! Convergence engine
//!
//! Walks the dependency chain in its fixed order, reconciling each
//! node and threading descriptors downstream. A failure halts the
//! chain; everything converged up to that point is returned in the
//! outcome so the caller can still report partial progress, and the
//! next run resumes by re-locating every node.
//!
//! Chain order:
//!
//! ```text
//! [image registry]* -> boundary -> credential -> instance
//!     -> gateway -> configuration -> share -> [fleet attachment]*
//! ```
//!
//! Starred nodes run only when configured. The fleet attachment is
//! best-effort: by the time it runs the chain is already converged, so
//! its failure is logged and withheld from the outcome's error.

use tracing::{error, info, warn};

use crate::cloud::Cloud;
use crate::config::EngineConfig;
use crate::reconcile::{self, Context};
use crate::resource::{ResourceKind, ResourceSet};
use crate::retry::RetryConfig;
use crate::{Error, Result};

/// Result of one convergence run
#[derive(Debug)]
pub struct RunOutcome {
    /// Every descriptor reconciled before the run ended
    pub resources: ResourceSet,
    /// The failure that halted the chain, if any
    pub error: Option<Error>,
}

impl RunOutcome {
    /// Whether the whole chain reached its desired state
    pub fn is_converged(&self) -> bool {
        self.error.is_none()
    }
}

/// One locate-only observation from a survey
#[derive(Clone, Debug)]
pub struct SurveyEntry {
    /// The kind that was looked up
    pub kind: ResourceKind,
    /// Identifier of the existing resource, or `None` when absent
    pub found: Option<String>,
}

/// The reconciliation engine for one configured chain
pub struct Engine {
    cloud: Cloud,
    config: EngineConfig,
    retry: RetryConfig,
}

impl Engine {
    /// Create an engine, validating the configuration up front
    pub fn new(cloud: Cloud, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cloud,
            config,
            retry: RetryConfig::default(),
        })
    }

    /// Replace the backoff policy used for locator calls
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The configuration this engine converges toward
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn context(&self) -> Context<'_> {
        Context {
            cloud: &self.cloud,
            config: &self.config,
            retry: &self.retry,
        }
    }

    /// Run the chain once, returning whatever converged
    pub async fn converge(&self) -> RunOutcome {
        let mut resources = ResourceSet::new();
        let error = self.run_chain(&mut resources).await.err();
        match &error {
            None => info!(resources = resources.len(), "chain converged"),
            Some(e) => {
                error!(
                    resources = resources.len(),
                    error = %e,
                    "run halted; converged nodes are kept and the next run resumes from them"
                );
            }
        }
        RunOutcome { resources, error }
    }

    async fn run_chain(&self, resources: &mut ResourceSet) -> Result<()> {
        let ctx = self.context();

        if self.config.registry_name.is_some() {
            resources.insert(reconcile::reconcile_registry(ctx).await?);
        }

        let boundary = reconcile::reconcile_boundary(ctx).await?;
        let boundary_id = boundary.id.clone();
        resources.insert(boundary);

        resources.insert(reconcile::reconcile_credential(ctx).await?);

        resources.insert(reconcile::reconcile_instance(ctx, &boundary_id).await?);

        let gateway = reconcile::reconcile_gateway(ctx, &boundary_id).await?;
        let gateway_id = gateway.id.clone();
        resources.insert(gateway);

        let address = resources
            .require(
                ResourceKind::ComputeInstance,
                ResourceKind::ExposureConfiguration,
            )?
            .require_address(ResourceKind::ExposureConfiguration)?
            .to_string();
        let configuration = reconcile::reconcile_configuration(ctx, &gateway_id, &address).await?;
        if configuration.arn.is_empty() {
            return Err(Error::dependency(
                ResourceKind::SharingGrant.as_str(),
                "arn",
                ResourceKind::ExposureConfiguration.as_str(),
            ));
        }
        let configuration_arn = configuration.arn.clone();
        resources.insert(configuration);

        resources.insert(reconcile::reconcile_share(ctx, &configuration_arn).await?);

        if self.config.fleet.is_some() {
            match reconcile::reconcile_fleet_attachment(ctx, &configuration_arn).await {
                Ok(descriptor) => resources.insert(descriptor),
                Err(e) => {
                    warn!(error = %e, "fleet attachment failed; chain is converged without it");
                }
            }
        }

        Ok(())
    }

    /// Look up every node without creating anything
    pub async fn survey(&self) -> Result<Vec<SurveyEntry>> {
        let ctx = self.context();
        let mut entries = Vec::new();

        if self.config.registry_name.is_some() {
            entries.push(SurveyEntry {
                kind: ResourceKind::ImageRegistry,
                found: reconcile::locate_repository(ctx).await?.map(|r| r.name),
            });
        }
        entries.push(SurveyEntry {
            kind: ResourceKind::SecurityBoundary,
            found: reconcile::locate_boundary(ctx).await?.map(|b| b.id),
        });
        entries.push(SurveyEntry {
            kind: ResourceKind::AccessCredential,
            found: reconcile::locate_credential(ctx).await?.map(|k| k.name),
        });
        entries.push(SurveyEntry {
            kind: ResourceKind::ComputeInstance,
            found: reconcile::locate_instance(ctx).await?.map(|i| i.id),
        });
        entries.push(SurveyEntry {
            kind: ResourceKind::ExposureGateway,
            found: reconcile::locate_gateway(ctx).await?.map(|g| g.id),
        });
        entries.push(SurveyEntry {
            kind: ResourceKind::ExposureConfiguration,
            found: reconcile::locate_configuration(ctx).await?.map(|c| c.id),
        });
        entries.push(SurveyEntry {
            kind: ResourceKind::SharingGrant,
            found: reconcile::locate_share(ctx).await?.map(|s| s.id),
        });

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::cloud::MemoryCloud;
    use crate::config::{test_config, FleetTarget};

    fn engine_with(memory: &MemoryCloud, config: EngineConfig) -> Engine {
        Engine::new(memory.clone().into_cloud(), config)
            .unwrap()
            .with_retry(RetryConfig::immediate(2))
    }

    fn scratch_config(dir: &tempfile::TempDir) -> EngineConfig {
        let mut config = test_config();
        config.secret_dir = dir.path().to_path_buf();
        config
    }

    #[tokio::test]
    async fn test_full_chain_converges() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryCloud::new();
        let engine = engine_with(&memory, scratch_config(&dir));

        let outcome = engine.converge().await;
        assert!(outcome.is_converged());
        assert_eq!(outcome.resources.len(), 6);
        assert!(outcome
            .resources
            .get(ResourceKind::SharingGrant)
            .is_some());
    }

    #[tokio::test]
    async fn test_halt_keeps_upstream_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryCloud::new();
        memory.inject_failure("create_instance", "capacity exhausted");
        let engine = engine_with(&memory, scratch_config(&dir));

        let outcome = engine.converge().await;
        assert!(!outcome.is_converged());
        assert!(outcome
            .resources
            .get(ResourceKind::SecurityBoundary)
            .is_some());
        assert!(outcome
            .resources
            .get(ResourceKind::AccessCredential)
            .is_some());
        assert!(outcome.resources.get(ResourceKind::ComputeInstance).is_none());
    }

    #[tokio::test]
    async fn test_fleet_failure_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryCloud::new();
        let mut config = scratch_config(&dir);
        // No fleet is seeded, so the attachment node hits not-found.
        config.fleet = Some(FleetTarget {
            farm_id: "farm-1".to_string(),
            fleet_id: "fleet-1".to_string(),
        });
        let engine = engine_with(&memory, config);

        let outcome = engine.converge().await;
        assert!(outcome.is_converged());
        assert!(outcome.resources.get(ResourceKind::FleetAttachment).is_none());
    }

    #[tokio::test]
    async fn test_survey_reports_absence_without_creating() {
        let memory = MemoryCloud::new();
        let engine = engine_with(&memory, test_config());

        let entries = engine.survey().await.unwrap();
        assert_eq!(entries.len(), 6);
        assert!(entries.iter().all(|e| e.found.is_none()));
        assert_eq!(memory.total_create_calls(), 0);
    }

    #[tokio::test]
    async fn test_survey_sees_converged_chain() {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryCloud::new();
        let engine = engine_with(&memory, scratch_config(&dir));

        assert!(engine.converge().await.is_converged());
        let entries = engine.survey().await.unwrap();
        assert!(entries.iter().all(|e| e.found.is_some()));
    }
}
