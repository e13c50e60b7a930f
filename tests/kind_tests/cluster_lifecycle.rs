//! Integration tests for the ephemeral cluster lifecycle
//!
//! These tests tell the story of a CI job that recreates its cluster on every
//! run: stale clusters are replaced, credentials land next to the job, and
//! the clients built from them can talk to the API server.

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};

use nsm_conncheck::kind::ClusterProvisioner;
use nsm_conncheck::kube_utils::{usable_kubeconfig, ClientContext};

use super::helpers::{cluster_name, init_tracing, kind_available, provisioner};

// =============================================================================
// Story: Recreating a cluster never leaves duplicates behind
// =============================================================================

#[tokio::test]
#[ignore]
async fn story_recreating_a_cluster_leaves_exactly_one() {
    init_tracing();
    if !kind_available() {
        eprintln!("kind not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let kind = provisioner(dir.path());
    let name = cluster_name("lifecycle");

    kind.ensure_cluster(&name).await.unwrap();
    kind.ensure_cluster(&name).await.unwrap();

    let clusters = kind.list_clusters().await.unwrap();
    assert_eq!(clusters.iter().filter(|c| **c == name).count(), 1);

    kind.delete_cluster(&name).await.unwrap();
    assert!(!kind.list_clusters().await.unwrap().contains(&name));
}

// =============================================================================
// Story: Fetched credentials reach the API server
// =============================================================================

#[tokio::test]
#[ignore]
async fn story_credentials_connect_to_the_cluster() {
    init_tracing();
    if !kind_available() {
        eprintln!("kind not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let kind = provisioner(dir.path());
    let name = cluster_name("credentials");

    let handle = kind.ensure_cluster(&name).await.unwrap();
    let handle = kind.fetch_credentials(&handle).await.unwrap();
    let kubeconfig = handle.credentials().unwrap();
    assert_eq!(kubeconfig, dir.path().join(format!("{}.kubeconfig", name)));
    assert!(usable_kubeconfig(kubeconfig));

    let ctx = ClientContext::connect(kubeconfig).await.unwrap();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), "kube-system");
    let listed = pods.list(&ListParams::default()).await;

    kind.delete_cluster(&name).await.unwrap();
    assert!(!listed.unwrap().items.is_empty());
}
