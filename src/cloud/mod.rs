//! External service contracts
//!
//! This module defines the trait seams between the engine and the
//! external systems it converges: network rules, compute, parameter
//! lookup, service exposure, cross-account sharing, the image registry,
//! and fleet metadata. The engine only ever sees these traits; concrete
//! provider SDK bindings live behind them.
//!
//! Every `list_*`/`find_*` operation must fully drain provider-side
//! pagination before returning. A partial listing that omits an
//! existing resource reads as "absent" to the locator and triggers a
//! duplicate create — the single most damaging bug this engine can
//! have. Implementations signal throttling with [`Error::Transient`]
//! and permission failures with [`Error::Provider`]; absence is an
//! empty listing or `None`, never an error dressed up as one.
//!
//! The [`MemoryCloud`] implementation backs tests and the CLI's demo
//! provider; cloud SDK providers are selected through [`create_cloud`]
//! the same way, once implemented.

mod memory;

pub use memory::MemoryCloud;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Source of an ingress rule
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleSource {
    /// An address block, e.g. the VPC CIDR
    Cidr(String),
    /// A provider-managed prefix list, e.g. the exposure service's
    PrefixList(String),
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSource::Cidr(cidr) => write!(f, "{cidr}"),
            RuleSource::PrefixList(id) => write!(f, "prefix:{id}"),
        }
    }
}

/// A single inbound network rule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngressRule {
    /// Protocol, e.g. "tcp"
    pub protocol: String,
    /// Port the rule opens
    pub port: u16,
    /// Where traffic is accepted from
    pub source: RuleSource,
}

impl IngressRule {
    /// A TCP rule for one port from the given source
    pub fn tcp(port: u16, source: RuleSource) -> Self {
        Self {
            protocol: "tcp".to_string(),
            port,
            source,
        }
    }
}

/// A security boundary (security group)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Boundary {
    /// Provider-assigned identifier
    pub id: String,
    /// Name the boundary was created under
    pub name: String,
}

/// An existing key pair, without material
///
/// Providers return key material exactly once at creation; a located
/// key pair never carries it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPairInfo {
    /// Key pair name
    pub name: String,
}

/// A freshly created key pair, with its one-time material
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewKeyPair {
    /// Key pair name
    pub name: String,
    /// PEM-encoded private key, returned only at creation
    pub material: String,
}

/// Lifecycle state of a compute instance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    /// Launch accepted, not yet running
    Pending,
    /// Running; the assigned address is available
    Running,
    /// Stopped but still owns its identity key
    Stopped,
}

/// A compute instance as the provider reports it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    /// Provider-assigned identifier
    pub id: String,
    /// Name tag (the identity key)
    pub name: String,
    /// Current lifecycle state
    pub state: InstanceState,
    /// Assigned private address; not guaranteed present until running
    pub private_ip: Option<String>,
}

/// Inputs for launching a compute instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceLaunch {
    /// Name tag applied at launch
    pub name: String,
    /// Concrete machine image identifier
    pub image_id: String,
    /// Instance class
    pub instance_type: String,
    /// Network placement
    pub subnet_id: String,
    /// Security boundary attached at launch
    pub boundary_id: String,
    /// Key pair for access
    pub key_pair_name: String,
    /// Bootstrap script body, run once on first boot
    pub user_data: String,
}

/// An exposure gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gateway {
    /// Provider-assigned identifier
    pub id: String,
    /// ARN-equivalent
    pub arn: String,
    /// Name the gateway was created under
    pub name: String,
    /// Provider-reported status, e.g. "ACTIVE"
    pub status: String,
}

/// Inputs for creating an exposure gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewaySpec {
    /// Identity key
    pub name: String,
    /// Network the gateway fronts
    pub vpc_id: String,
    /// Subnet placement
    pub subnet_id: String,
    /// Security boundary applied to gateway traffic
    pub boundary_id: String,
}

/// An exposure configuration targeting one address and port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfiguration {
    /// Provider-assigned identifier
    pub id: String,
    /// ARN-equivalent
    pub arn: String,
    /// Name the configuration was created under
    pub name: String,
    /// Address the configuration forwards to
    pub target_address: String,
    /// Port the configuration forwards to
    pub port: u16,
    /// Provider-reported status
    pub status: String,
}

/// Inputs for creating an exposure configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigurationSpec {
    /// Identity key
    pub name: String,
    /// Gateway the configuration rides on
    pub gateway_id: String,
    /// Target address; must be the instance's assigned address
    pub target_address: String,
    /// Target port
    pub port: u16,
}

/// A cross-account sharing grant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Share {
    /// Provider-assigned identifier
    pub id: String,
    /// ARN-equivalent; associations are keyed by this
    pub arn: String,
    /// Name the share was created under
    pub name: String,
    /// Provider-reported status, e.g. "ACTIVE"
    pub status: String,
}

/// Inputs for creating a sharing grant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareSpec {
    /// Identity key
    pub name: String,
    /// First resource associated at creation
    pub resource_arn: String,
    /// Whether principals outside the organization may be added
    pub allow_external_principals: bool,
}

/// A container image repository
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    /// Repository name
    pub name: String,
    /// Push/pull URI
    pub uri: String,
    /// ARN-equivalent
    pub arn: String,
}

/// Fleet configuration relevant to the attachment node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FleetConfig {
    /// Resource ARNs currently attached to the fleet
    pub resource_arns: Vec<String>,
}

/// Network rule storage for a security boundary
///
/// `add_rule` returns [`Error::Duplicate`] when the identical rule is
/// already present; the reconciler treats that as success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NetworkRuleService: Send + Sync {
    /// List the rules currently on a boundary
    async fn list_rules(&self, boundary_id: &str) -> Result<Vec<IngressRule>>;

    /// Add one inbound rule to a boundary
    async fn add_rule(&self, boundary_id: &str, rule: &IngressRule) -> Result<()>;

    /// The CIDR block of the given network
    async fn vpc_cidr(&self, vpc_id: &str) -> Result<String>;

    /// The managed prefix list of the exposure service, if published
    /// in this region
    async fn service_prefix_list(&self) -> Result<Option<String>>;
}

/// Compute instance and key pair lifecycle
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Find a boundary by name within a network, or `None`
    async fn find_boundary(&self, name: &str, vpc_id: &str) -> Result<Option<Boundary>>;

    /// Create a boundary; only called after `find_boundary` returned `None`
    async fn create_boundary(
        &self,
        name: &str,
        vpc_id: &str,
        description: &str,
    ) -> Result<Boundary>;

    /// Find a key pair by name, or `None`
    async fn find_key_pair(&self, name: &str) -> Result<Option<KeyPairInfo>>;

    /// Create a key pair; the returned material exists only in this response
    async fn create_key_pair(&self, name: &str) -> Result<NewKeyPair>;

    /// Find an instance by its name tag, or `None`
    ///
    /// Terminated instances do not count as matches; their identity key
    /// is considered released.
    async fn find_instance(&self, name: &str) -> Result<Option<Instance>>;

    /// Launch an instance; returns the initial (usually pending) view
    async fn create_instance(&self, launch: &InstanceLaunch) -> Result<Instance>;

    /// Block until the instance is running, up to `timeout`
    ///
    /// Returns [`Error::ReadinessTimeout`] if the state is never reached.
    async fn wait_until_running(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Re-read an instance to pick up fields assigned after launch
    async fn describe_instance(&self, id: &str) -> Result<Instance>;
}

/// Symbolic parameter lookup (machine image resolution)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ParameterService: Send + Sync {
    /// Resolve a parameter path to its value
    async fn get_parameter(&self, path: &str) -> Result<String>;
}

/// Exposure gateway and configuration lifecycle
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GatewayService: Send + Sync {
    /// All gateways in scope, pagination drained
    async fn list_gateways(&self) -> Result<Vec<Gateway>>;

    /// Create a gateway
    async fn create_gateway(&self, spec: &GatewaySpec) -> Result<Gateway>;

    /// All configurations in scope, pagination drained
    async fn list_configurations(&self) -> Result<Vec<GatewayConfiguration>>;

    /// Create a configuration
    async fn create_configuration(&self, spec: &ConfigurationSpec) -> Result<GatewayConfiguration>;
}

/// Cross-account sharing grants and their associations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SharingService: Send + Sync {
    /// All shares owned by the caller, pagination drained
    async fn list_shares(&self) -> Result<Vec<Share>>;

    /// Create a share with its first resource association
    async fn create_share(&self, spec: &ShareSpec) -> Result<Share>;

    /// ARNs of resources currently associated with a share
    async fn list_associated_resources(&self, share_arn: &str) -> Result<Vec<String>>;

    /// Associate one more resource with an existing share
    async fn associate_resource(&self, share_arn: &str, resource_arn: &str) -> Result<()>;

    /// Associate a service principal with a share
    async fn associate_principal(
        &self,
        share_arn: &str,
        principal: &str,
        source_account: &str,
    ) -> Result<()>;

    /// The calling account's identifier
    async fn caller_account(&self) -> Result<String>;
}

/// Container image repository lifecycle
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegistryService: Send + Sync {
    /// Find a repository by name, or `None`
    async fn find_repository(&self, name: &str) -> Result<Option<Repository>>;

    /// Create a repository
    async fn create_repository(&self, name: &str) -> Result<Repository>;
}

/// Fleet/queue metadata, consumed by the best-effort trailing node
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FleetMetadataService: Send + Sync {
    /// Current fleet configuration
    async fn get_fleet(&self, farm_id: &str, fleet_id: &str) -> Result<FleetConfig>;

    /// Replace the fleet's attached resource ARNs
    async fn update_fleet(
        &self,
        farm_id: &str,
        fleet_id: &str,
        config: &FleetConfig,
    ) -> Result<()>;
}

/// Handles to every external service the engine talks to
#[derive(Clone)]
pub struct Cloud {
    /// Network rule storage
    pub network: Arc<dyn NetworkRuleService>,
    /// Compute instances and key pairs
    pub compute: Arc<dyn ComputeService>,
    /// Parameter lookup
    pub parameters: Arc<dyn ParameterService>,
    /// Exposure gateways and configurations
    pub gateway: Arc<dyn GatewayService>,
    /// Sharing grants
    pub sharing: Arc<dyn SharingService>,
    /// Image repositories
    pub registry: Arc<dyn RegistryService>,
    /// Fleet metadata
    pub fleet: Arc<dyn FleetMetadataService>,
}

impl std::fmt::Debug for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cloud").finish_non_exhaustive()
    }
}

/// Which provider implementation backs the [`Cloud`] handles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-memory provider for tests and demos
    Memory,
    /// AWS SDK bindings
    Aws,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Memory => f.write_str("memory"),
            ProviderKind::Aws => f.write_str("aws"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(ProviderKind::Memory),
            "aws" => Ok(ProviderKind::Aws),
            other => Err(Error::validation(format!(
                "unknown provider '{other}', expected one of: memory, aws"
            ))),
        }
    }
}

/// Create the service handles for the given provider
///
/// # Returns
///
/// A [`Cloud`] bundle, or an error if the provider is not available in
/// this build.
pub fn create_cloud(kind: ProviderKind) -> Result<Cloud> {
    match kind {
        ProviderKind::Memory => Ok(MemoryCloud::new().into_cloud()),
        ProviderKind::Aws => Err(Error::provider(
            "aws provider bindings not yet implemented; use the library \
             traits with your own SDK clients",
        )),
    }
}
