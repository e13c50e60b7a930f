//! Per-run cluster session built from a credentials file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use crate::exec::{KubeExecutor, RemoteExec};
use crate::kube_utils::ClientContext;
use crate::workload::{KubeWorkloads, WorkloadApi};
use crate::Result;

/// Remote capabilities of one cluster, injected into every step that needs them
#[derive(Clone)]
pub struct ClusterSession {
    /// Deployment, Service and Pod API
    pub workloads: Arc<dyn WorkloadApi>,
    /// In-container command execution
    pub exec: Arc<dyn RemoteExec>,
}

/// Builds a [`ClusterSession`] from a kubeconfig.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, kubeconfig: &Path) -> Result<ClusterSession>;
}

/// [`Connector`] backed by real kube clients
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeConnector;

#[async_trait]
impl Connector for KubeConnector {
    async fn connect(&self, kubeconfig: &Path) -> Result<ClusterSession> {
        let ctx = ClientContext::connect(kubeconfig).await?;
        info!(kubeconfig = %ctx.kubeconfig().display(), "Connected to cluster");
        Ok(ClusterSession {
            workloads: Arc::new(KubeWorkloads::new(ctx.client.clone())),
            exec: Arc::new(KubeExecutor::new(ctx.exec_client.clone())),
        })
    }
}
