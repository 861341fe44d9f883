//! Engine configuration
//!
//! An [`EngineConfig`] is the immutable description of the target
//! environment and the identity keys of every resource in the chain.
//! It is constructed once per run (from a YAML file or in code),
//! validated up front, and passed into the engine by reference. There
//! is no process-wide mutable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default bootstrap script body for the proxy instance.
///
/// Runs once on first boot: enables reverse-tunnel support in sshd and
/// prepares the tunnel account's authorized_keys file.
pub const DEFAULT_BOOTSTRAP_SCRIPT: &str = r#"#!/bin/bash
set -e

# Enable GatewayPorts so -R binds on 0.0.0.0 instead of 127.0.0.1
sed -i 's/#GatewayPorts no/GatewayPorts yes/' /etc/ssh/sshd_config
sed -i 's/GatewayPorts no/GatewayPorts yes/' /etc/ssh/sshd_config
grep -q "^GatewayPorts yes" /etc/ssh/sshd_config || echo "GatewayPorts yes" >> /etc/ssh/sshd_config
systemctl restart sshd

mkdir -p /home/ssm-user/.ssh
chmod 700 /home/ssm-user/.ssh
touch /home/ssm-user/.ssh/authorized_keys
chmod 600 /home/ssm-user/.ssh/authorized_keys
chown -R ssm-user:ssm-user /home/ssm-user/.ssh

echo "proxy setup complete"
"#;

/// Default bounded wait for the instance to reach running, in seconds
pub const DEFAULT_READINESS_TIMEOUT_SECS: u64 = 300;

/// Default port exposed through the exposure configuration (SSH)
pub const DEFAULT_EXPOSED_PORT: u16 = 22;

fn default_instance_type() -> String {
    "t3.micro".to_string()
}

fn default_ports() -> Vec<u16> {
    vec![22, 6080, 8188]
}

fn default_exposed_port() -> u16 {
    DEFAULT_EXPOSED_PORT
}

fn default_readiness_timeout() -> u64 {
    DEFAULT_READINESS_TIMEOUT_SECS
}

fn default_secret_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Target fleet for the optional trailing attachment node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetTarget {
    /// Farm identifier
    pub farm_id: String,
    /// Fleet identifier within the farm
    pub fleet_id: String,
}

/// Immutable configuration for one convergence run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Provider region
    pub region: String,
    /// Network (VPC) identifier the chain lives in
    pub vpc_id: String,
    /// Subnet for the instance and the gateway
    pub subnet_id: String,

    /// Identity key of the security boundary
    pub boundary_name: String,
    /// Identity key of the key pair
    pub key_pair_name: String,
    /// Identity key (Name tag) of the proxy instance
    pub instance_name: String,
    /// Instance class for the proxy
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    /// Parameter-store path resolving to the machine image
    pub image_parameter: String,
    /// Bootstrap script body passed at launch; defaults to the built-in
    /// reverse-tunnel setup script
    #[serde(default)]
    pub bootstrap_script: Option<String>,

    /// Identity key of the exposure gateway
    pub gateway_name: String,
    /// Identity key of the exposure configuration
    pub configuration_name: String,
    /// Identity key of the sharing grant
    pub share_name: String,
    /// Service principal the grant is shared with
    pub share_principal: String,

    /// Optional container image repository reconciled ahead of the chain
    #[serde(default)]
    pub registry_name: Option<String>,
    /// Optional fleet the grant is attached to, best-effort
    #[serde(default)]
    pub fleet: Option<FleetTarget>,

    /// Ports opened on the boundary (from the network CIDR and, when
    /// available, the managed service prefix list)
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    /// Port the exposure configuration targets on the instance
    #[serde(default = "default_exposed_port")]
    pub exposed_port: u16,

    /// Directory the credential material is written into
    #[serde(default = "default_secret_dir")]
    pub secret_dir: PathBuf,
    /// Bounded wait for the instance to reach running
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,
}

impl EngineConfig {
    /// Load and validate a configuration from a YAML file
    pub async fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: EngineConfig = serde_yaml::from_str(&content).map_err(|e| {
            Error::serialization(format!("failed to parse config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration before a run
    ///
    /// Catches misconfigurations up front rather than mid-chain, where a
    /// failure would leave a partial convergence for no good reason.
    pub fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            return Err(Error::validation("region must not be empty"));
        }
        if self.vpc_id.is_empty() {
            return Err(Error::validation("vpc_id must not be empty"));
        }
        if self.subnet_id.is_empty() {
            return Err(Error::validation("subnet_id must not be empty"));
        }
        for (field, value) in [
            ("boundary_name", &self.boundary_name),
            ("key_pair_name", &self.key_pair_name),
            ("instance_name", &self.instance_name),
            ("image_parameter", &self.image_parameter),
            ("gateway_name", &self.gateway_name),
            ("configuration_name", &self.configuration_name),
            ("share_name", &self.share_name),
            ("share_principal", &self.share_principal),
        ] {
            if value.is_empty() {
                return Err(Error::validation(format!("{field} must not be empty")));
            }
        }
        if self.ports.is_empty() {
            return Err(Error::validation("at least one port must be configured"));
        }
        if !self.ports.contains(&self.exposed_port) {
            return Err(Error::validation(format!(
                "exposed_port {} must be among the boundary ports {:?}",
                self.exposed_port, self.ports
            )));
        }
        if self.readiness_timeout_secs == 0 {
            return Err(Error::validation("readiness_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// The bootstrap script body to pass at instance launch
    pub fn bootstrap_script(&self) -> &str {
        self.bootstrap_script
            .as_deref()
            .unwrap_or(DEFAULT_BOOTSTRAP_SCRIPT)
    }

    /// Path the credential material is written to
    pub fn credential_path(&self) -> PathBuf {
        self.secret_dir.join(format!("{}.pem", self.key_pair_name))
    }
}

/// A complete configuration for tests, mirroring the demo environment
#[cfg(test)]
pub(crate) fn test_config() -> EngineConfig {
    EngineConfig {
        region: "us-west-2".to_string(),
        vpc_id: "vpc-089c2522bf414cff2".to_string(),
        subnet_id: "subnet-044edd1290db6f355".to_string(),
        boundary_name: "render-proxy-sg".to_string(),
        key_pair_name: "render-proxy-key".to_string(),
        instance_name: "render-proxy".to_string(),
        instance_type: default_instance_type(),
        image_parameter: "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64"
            .to_string(),
        bootstrap_script: None,
        gateway_name: "render-proxy-gateway".to_string(),
        configuration_name: "render-proxy-config".to_string(),
        share_name: "render-proxy-share".to_string(),
        share_principal: "fleets.deadline.amazonaws.com".to_string(),
        registry_name: None,
        fleet: None,
        ports: default_ports(),
        exposed_port: 22,
        secret_dir: default_secret_dir(),
        readiness_timeout_secs: DEFAULT_READINESS_TIMEOUT_SECS,
    }
}
