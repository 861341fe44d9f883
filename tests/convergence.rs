//! End-to-end convergence scenarios against the in-memory provider.

use trellis::cloud::{FleetConfig, MemoryCloud};
use trellis::config::{EngineConfig, FleetTarget};
use trellis::engine::Engine;
use trellis::manifest::Manifest;
use trellis::resource::{ResourceKind, ResourceStatus};
use trellis::retry::RetryConfig;

fn scenario_config(dir: &tempfile::TempDir) -> EngineConfig {
    let yaml = r#"
region: us-west-2
vpc_id: vpc-089c2522bf414cff2
subnet_id: subnet-044edd1290db6f355
boundary_name: render-proxy-sg
key_pair_name: render-proxy-key
instance_name: render-proxy
image_parameter: /aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64
gateway_name: render-proxy-gateway
configuration_name: render-proxy-config
share_name: render-proxy-share
share_principal: fleets.deadline.amazonaws.com
"#;
    let mut config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
    config.secret_dir = dir.path().to_path_buf();
    config
}

fn engine(memory: &MemoryCloud, config: EngineConfig) -> Engine {
    Engine::new(memory.clone().into_cloud(), config)
        .unwrap()
        .with_retry(RetryConfig::immediate(2))
}

#[tokio::test]
async fn first_run_builds_the_whole_chain() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    let config = scenario_config(&dir);
    let engine = engine(&memory, config.clone());

    let outcome = engine.converge().await;
    assert!(outcome.is_converged(), "error: {:?}", outcome.error);

    let instance = outcome.resources.get(ResourceKind::ComputeInstance).unwrap();
    assert_eq!(instance.address.as_deref(), Some("10.0.1.5"));
    assert_eq!(instance.status, ResourceStatus::Active);

    let manifest = Manifest::build(&config, &outcome.resources);
    let cfg = manifest.configuration.unwrap();
    assert_eq!(
        cfg.endpoint,
        "cfg-1.resource-endpoints.deadline.us-west-2.amazonaws.com"
    );
    assert_eq!(cfg.port, 22);
    assert_eq!(manifest.boundary.unwrap().id, "sb-1");
    assert_eq!(manifest.gateway.unwrap().id, "gw-1");

    // Exactly one create per node in the base chain.
    for op in [
        "create_boundary",
        "create_key_pair",
        "create_instance",
        "create_gateway",
        "create_configuration",
        "create_share",
    ] {
        assert_eq!(memory.create_calls(op), 1, "unexpected count for {op}");
    }
}

#[tokio::test]
async fn second_run_creates_nothing_and_reports_the_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    let config = scenario_config(&dir);
    let engine = engine(&memory, config.clone());

    let first = engine.converge().await;
    assert!(first.is_converged());
    let creates_after_first = memory.total_create_calls();
    let first_manifest =
        serde_json::to_string(&Manifest::build(&config, &first.resources)).unwrap();

    let second = engine.converge().await;
    assert!(second.is_converged());
    assert_eq!(memory.total_create_calls(), creates_after_first);

    let second_manifest =
        serde_json::to_string(&Manifest::build(&config, &second.resources)).unwrap();
    assert_eq!(first_manifest, second_manifest);
}

#[tokio::test]
async fn failed_run_resumes_without_duplicating_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    let config = scenario_config(&dir);
    let engine = engine(&memory, config.clone());

    memory.inject_failure("create_instance", "insufficient capacity");
    let outcome = engine.converge().await;
    assert!(!outcome.is_converged());
    assert!(outcome.resources.get(ResourceKind::SecurityBoundary).is_some());
    assert!(outcome.resources.get(ResourceKind::AccessCredential).is_some());
    assert!(outcome.resources.get(ResourceKind::ComputeInstance).is_none());

    // A partial manifest is still buildable from what converged.
    let partial = Manifest::build(&config, &outcome.resources);
    assert!(partial.boundary.is_some());
    assert!(partial.instance.is_none());

    memory.clear_failure("create_instance");
    let outcome = engine.converge().await;
    assert!(outcome.is_converged());

    // Upstream nodes were relocated, not recreated.
    assert_eq!(memory.create_calls("create_boundary"), 1);
    assert_eq!(memory.create_calls("create_key_pair"), 1);
    assert_eq!(memory.create_calls("create_instance"), 1);
}

#[tokio::test]
async fn credential_material_is_written_once_with_owner_only_access() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    let config = scenario_config(&dir);
    let engine = engine(&memory, config.clone());

    assert!(engine.converge().await.is_converged());

    let path = config.credential_path();
    let material = std::fs::read_to_string(&path).unwrap();
    assert!(material.contains("BEGIN RSA PRIVATE KEY"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    // The reuse path must not touch the file.
    assert!(engine.converge().await.is_converged());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), material);
    assert_eq!(memory.create_calls("create_key_pair"), 1);
}

#[tokio::test]
async fn share_associations_grow_monotonically() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    let config = scenario_config(&dir);
    let engine = engine(&memory, config.clone());

    assert!(engine.converge().await.is_converged());
    let share_arn = "arn:memory:share/share-1";
    assert_eq!(
        memory.share_resource_arns(share_arn),
        vec!["arn:memory:configuration/cfg-1".to_string()]
    );
    assert_eq!(memory.share_principals(share_arn).len(), 1);

    // Someone else associates another resource between runs.
    memory
        .clone()
        .into_cloud()
        .sharing
        .associate_resource(share_arn, "arn:memory:configuration/cfg-foreign")
        .await
        .unwrap();

    assert!(engine.converge().await.is_converged());
    let arns = memory.share_resource_arns(share_arn);
    assert_eq!(arns.len(), 2, "foreign association must survive: {arns:?}");
    assert_eq!(memory.share_principals(share_arn).len(), 1);
}

#[tokio::test]
async fn fleet_attachment_converges_and_stays_attached() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    memory.put_fleet(
        "farm-1",
        "fleet-1",
        FleetConfig {
            resource_arns: vec!["arn:memory:configuration/cfg-preexisting".to_string()],
        },
    );
    let mut config = scenario_config(&dir);
    config.fleet = Some(FleetTarget {
        farm_id: "farm-1".to_string(),
        fleet_id: "fleet-1".to_string(),
    });
    let engine = engine(&memory, config.clone());

    let outcome = engine.converge().await;
    assert!(outcome.is_converged());
    assert!(outcome.resources.get(ResourceKind::FleetAttachment).is_some());

    let cloud = memory.clone().into_cloud();
    let fleet = cloud.fleet.get_fleet("farm-1", "fleet-1").await.unwrap();
    assert_eq!(fleet.resource_arns.len(), 2);
    assert!(fleet
        .resource_arns
        .iter()
        .any(|a| a == "arn:memory:configuration/cfg-1"));

    // Second run leaves the attachment list unchanged.
    assert!(engine.converge().await.is_converged());
    let fleet = cloud.fleet.get_fleet("farm-1", "fleet-1").await.unwrap();
    assert_eq!(fleet.resource_arns.len(), 2);

    let manifest = Manifest::build(&config, &outcome.resources);
    assert_eq!(manifest.fleet.unwrap().fleet_id, "fleet-1");
}

#[tokio::test]
async fn missing_fleet_never_fails_a_converged_chain() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    let mut config = scenario_config(&dir);
    config.fleet = Some(FleetTarget {
        farm_id: "farm-none".to_string(),
        fleet_id: "fleet-none".to_string(),
    });
    let engine = engine(&memory, config);

    let outcome = engine.converge().await;
    assert!(outcome.is_converged());
    assert!(outcome.resources.get(ResourceKind::SharingGrant).is_some());
    assert!(outcome.resources.get(ResourceKind::FleetAttachment).is_none());
}

#[tokio::test]
async fn registry_node_leads_the_chain_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryCloud::new();
    let mut config = scenario_config(&dir);
    config.registry_name = Some("render-assets".to_string());
    let engine = engine(&memory, config.clone());

    let outcome = engine.converge().await;
    assert!(outcome.is_converged());
    let registry = outcome.resources.get(ResourceKind::ImageRegistry).unwrap();
    assert!(registry.address.as_deref().unwrap().contains("render-assets"));

    assert!(engine.converge().await.is_converged());
    assert_eq!(memory.create_calls("create_repository"), 1);
}
