//! Resource descriptors and the per-run working set
//!
//! A [`ResourceDescriptor`] is the canonical representation of one
//! reconciled resource: kind, provider-assigned identifier and ARN,
//! status, and the kind-specific outputs downstream nodes consume (an
//! assigned network address, an exposed port).
//!
//! Descriptors live only in the engine's working set for the duration
//! of a run. All memory of what already exists lives in the external
//! system and is rediscovered every run by the locators.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The fixed set of resource kinds the engine reconciles, in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Container image repository (optional leading node)
    ImageRegistry,
    /// Network security group plus its ingress rule set
    SecurityBoundary,
    /// SSH key pair; material persisted locally exactly once
    AccessCredential,
    /// Proxy instance; must reach running before anything downstream
    ComputeInstance,
    /// Service-exposure gateway
    ExposureGateway,
    /// Service-exposure configuration targeting the instance address
    ExposureConfiguration,
    /// Cross-account sharing grant with its resource associations
    SharingGrant,
    /// Optional best-effort attachment of the grant to a fleet
    FleetAttachment,
}

impl ResourceKind {
    /// Stable string form used in logs, errors, and the manifest
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ImageRegistry => "image-registry",
            ResourceKind::SecurityBoundary => "security-boundary",
            ResourceKind::AccessCredential => "access-credential",
            ResourceKind::ComputeInstance => "compute-instance",
            ResourceKind::ExposureGateway => "exposure-gateway",
            ResourceKind::ExposureConfiguration => "exposure-configuration",
            ResourceKind::SharingGrant => "sharing-grant",
            ResourceKind::FleetAttachment => "fleet-attachment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a reconciled resource
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// Created or found but not yet confirmed usable
    #[default]
    Pending,
    /// Usable; downstream nodes may consume its outputs
    Active,
    /// Reconciliation failed for this kind
    Failed,
}

/// Canonical representation of one reconciled resource instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource kind tag
    pub kind: ResourceKind,
    /// Provider-assigned identifier
    pub id: String,
    /// Provider-assigned ARN-equivalent, empty if the kind has none
    #[serde(default)]
    pub arn: String,
    /// Lifecycle status
    pub status: ResourceStatus,
    /// Assigned network address (compute instance) or target address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Exposed port (exposure configuration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ResourceDescriptor {
    /// Create a new descriptor with the given kind and identifier
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            arn: String::new(),
            status: ResourceStatus::Pending,
            address: None,
            port: None,
        }
    }

    /// Set the ARN-equivalent
    pub fn with_arn(mut self, arn: impl Into<String>) -> Self {
        self.arn = arn.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the assigned network address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the exposed port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// The assigned address, or a dependency error naming the consumer
    ///
    /// Used when a downstream kind needs this descriptor's address to
    /// build its own spec.
    pub fn require_address(&self, consumer: ResourceKind) -> Result<&str> {
        match self.address.as_deref() {
            Some(addr) if !addr.is_empty() => Ok(addr),
            _ => Err(Error::dependency(
                consumer.as_str(),
                "address",
                self.kind.as_str(),
            )),
        }
    }
}

/// The engine's working set of reconciled resources, keyed by kind.
///
/// Each kind appears at most once; the graph is a fixed chain, not a
/// general DAG.
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    resources: BTreeMap<ResourceKind, ResourceDescriptor>,
}

impl ResourceSet {
    /// Create an empty working set
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a reconciled descriptor for downstream lookup
    pub fn insert(&mut self, descriptor: ResourceDescriptor) {
        self.resources.insert(descriptor.kind, descriptor);
    }

    /// Look up a descriptor by kind
    pub fn get(&self, kind: ResourceKind) -> Option<&ResourceDescriptor> {
        self.resources.get(&kind)
    }

    /// Look up a descriptor a downstream node depends on
    ///
    /// Returns a dependency error naming both kinds when the upstream
    /// result is missing, which indicates an upstream partial failure.
    pub fn require(&self, kind: ResourceKind, consumer: ResourceKind) -> Result<&ResourceDescriptor> {
        self.resources.get(&kind).ok_or_else(|| {
            Error::dependency(consumer.as_str(), "descriptor", kind.as_str())
        })
    }

    /// Number of reconciled resources in the set
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterate over descriptors in dependency order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values()
    }
}
