//! Integration tests for client deployment and pairwise probing
//!
//! The pod network stands in for the mesh: discovery reads `eth0`, so the
//! clients can be probed without installing the mesh first.

use nsm_conncheck::commands::build_scenario;
use nsm_conncheck::config::ScenarioConfig;
use nsm_conncheck::kind::ClusterProvisioner;
use nsm_conncheck::scenario::{verify_connectivity, Connector, KubeConnector};
use nsm_conncheck::workload::deploy_clients;

use super::helpers::{cluster_name, init_tracing, kind_available, provisioner};

// =============================================================================
// Story: Two clients on the pod network reach each other
// =============================================================================

#[tokio::test]
#[ignore]
async fn story_clients_on_the_pod_network_reach_each_other() {
    init_tracing();
    if !kind_available() {
        eprintln!("kind not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let kind = provisioner(dir.path());
    let name = cluster_name("pod-network");

    let mut config = ScenarioConfig::default();
    config.cluster_name = name.clone();
    config.probe.interface = "eth0".to_string();
    config.retry.attempts = 15;

    let handle = kind.ensure_cluster(&name).await.unwrap();
    let handle = kind.fetch_credentials(&handle).await.unwrap();
    let kubeconfig = handle.credentials().unwrap();
    let session = KubeConnector.connect(kubeconfig).await.unwrap();

    let result = match deploy_clients(session.workloads.as_ref(), &config.workload).await {
        Ok(_) => verify_connectivity(&session, &config).await,
        Err(e) => Err(e),
    };

    kind.delete_cluster(&name).await.unwrap();
    let report = result.unwrap();
    assert_eq!(report.total(), 1);
    assert_eq!(report.passed(), 1);
}

// =============================================================================
// Story: The full scenario installs the mesh and probes over it
// =============================================================================

#[tokio::test]
#[ignore]
async fn story_full_scenario() {
    init_tracing();
    if !kind_available() || std::env::var_os(nsm_conncheck::config::BASE_DIR_ENV).is_none() {
        eprintln!("kind or NSM_NSE_DIR missing, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = ScenarioConfig::default();
    config.cluster_name = cluster_name("full");
    config.output_dir = dir.path().to_path_buf();
    config.teardown = true;

    let report = build_scenario(config).run().await.unwrap();
    assert!(report.total() >= 1);
}
