//! Output manifest
//!
//! A pure projection of the working set into the JSON document handed
//! to the operator. Building it performs no external calls, so a
//! partially converged run still produces a manifest covering whatever
//! exists. Sections for nodes that never reconciled are omitted.

use std::path::Path;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::resource::{ResourceKind, ResourceSet};
use crate::{Error, Result};

/// Hostname the exposure service publishes for a configuration
pub fn endpoint_for(region: &str, configuration_id: &str) -> String {
    format!("{configuration_id}.resource-endpoints.deadline.{region}.amazonaws.com")
}

/// The document written at the end of a run
#[derive(Clone, Debug, Serialize)]
pub struct Manifest {
    /// Provider region the chain lives in
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistrySection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary: Option<BoundarySection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<KeyPairSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewaySection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ConfigurationSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<ShareSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet: Option<FleetSection>,
    /// Operator instructions derived from what converged
    pub next_steps: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegistrySection {
    pub name: String,
    pub uri: String,
    pub arn: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct BoundarySection {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct KeyPairSection {
    pub name: String,
    /// Where the private material was written at creation
    pub path: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceSection {
    pub id: String,
    pub private_ip: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct GatewaySection {
    pub id: String,
    pub arn: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConfigurationSection {
    pub id: String,
    pub arn: String,
    pub name: String,
    /// Hostname published by the exposure service
    pub endpoint: String,
    pub port: u16,
}

#[derive(Clone, Debug, Serialize)]
pub struct ShareSection {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub principal: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct FleetSection {
    pub farm_id: String,
    pub fleet_id: String,
}

impl Manifest {
    /// Project the working set into a manifest
    pub fn build(config: &EngineConfig, resources: &ResourceSet) -> Self {
        let registry = resources.get(ResourceKind::ImageRegistry).map(|d| {
            RegistrySection {
                name: d.id.clone(),
                uri: d.address.clone().unwrap_or_default(),
                arn: d.arn.clone(),
            }
        });

        let boundary = resources
            .get(ResourceKind::SecurityBoundary)
            .map(|d| BoundarySection {
                id: d.id.clone(),
                name: config.boundary_name.clone(),
            });

        let key_pair = resources
            .get(ResourceKind::AccessCredential)
            .map(|d| KeyPairSection {
                name: d.id.clone(),
                path: config.credential_path().display().to_string(),
            });

        let instance = resources
            .get(ResourceKind::ComputeInstance)
            .map(|d| InstanceSection {
                id: d.id.clone(),
                private_ip: d.address.clone().unwrap_or_default(),
            });

        let gateway = resources
            .get(ResourceKind::ExposureGateway)
            .map(|d| GatewaySection {
                id: d.id.clone(),
                arn: d.arn.clone(),
                name: config.gateway_name.clone(),
            });

        let configuration =
            resources
                .get(ResourceKind::ExposureConfiguration)
                .map(|d| ConfigurationSection {
                    id: d.id.clone(),
                    arn: d.arn.clone(),
                    name: config.configuration_name.clone(),
                    endpoint: endpoint_for(&config.region, &d.id),
                    port: d.port.unwrap_or(config.exposed_port),
                });

        let share = resources
            .get(ResourceKind::SharingGrant)
            .map(|d| ShareSection {
                id: d.id.clone(),
                arn: d.arn.clone(),
                name: config.share_name.clone(),
                principal: config.share_principal.clone(),
            });

        let fleet = resources
            .get(ResourceKind::FleetAttachment)
            .and_then(|_| config.fleet.as_ref())
            .map(|target| FleetSection {
                farm_id: target.farm_id.clone(),
                fleet_id: target.fleet_id.clone(),
            });

        let next_steps = next_steps(config, &key_pair, &instance, &configuration);

        Self {
            region: config.region.clone(),
            registry,
            boundary,
            key_pair,
            instance,
            gateway,
            configuration,
            share,
            fleet,
            next_steps,
        }
    }

    /// Serialize and write the manifest as pretty JSON
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::serialization(format!("failed to encode manifest: {e}")))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

fn next_steps(
    config: &EngineConfig,
    key_pair: &Option<KeyPairSection>,
    instance: &Option<InstanceSection>,
    configuration: &Option<ConfigurationSection>,
) -> Vec<String> {
    let mut steps = Vec::new();

    if let (Some(key), Some(inst)) = (key_pair, instance) {
        steps.push(format!(
            "Start the reverse tunnel from the workstation: \
             ssh -i {} -N -R {}:localhost:{} ec2-user@{}",
            key.path, config.exposed_port, config.exposed_port, inst.private_ip
        ));
    }
    if let Some(cfg) = configuration {
        steps.push(format!(
            "Workers reach the workstation at {}:{}",
            cfg.endpoint, cfg.port
        ));
    }
    if steps.is_empty() {
        steps.push("Re-run converge to finish the remaining resources".to_string());
    }
    steps
}
