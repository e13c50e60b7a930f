//! Kubernetes client construction from a stored kubeconfig
//!
//! Two clients are built per run. The API client fails hard on a bad
//! kubeconfig. The exec client falls back to ambient discovery
//! (`KUBECONFIG`, `~/.kube/config`, in-cluster) when the given path is
//! missing or empty.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::warn;

use crate::{Error, Result};

/// Connection timeout for kube clients (local kind API server)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for the API client
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated clients for one run, shared read-only by every remote step.
#[derive(Clone)]
pub struct ClientContext {
    /// Client for CRUD over deployments, services and pods
    pub client: Client,
    /// Client for the streaming exec sub-resource
    pub exec_client: Client,
    kubeconfig: PathBuf,
}

impl ClientContext {
    /// Build both clients from one credentials file
    pub async fn connect(kubeconfig: &Path) -> Result<Self> {
        let client = build_client(kubeconfig).await?;
        let exec_client = build_exec_client(kubeconfig).await?;
        Ok(Self {
            client,
            exec_client,
            kubeconfig: kubeconfig.to_path_buf(),
        })
    }

    /// Credentials file the clients were built from
    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }
}

/// Load a client config from an explicit kubeconfig file
pub async fn load_config(path: &Path) -> Result<Config> {
    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| Error::kubeconfig(path, format!("failed to read kubeconfig: {}", e)))?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::kubeconfig(path, format!("failed to load kubeconfig: {}", e)))
}

/// Build the API client. Missing, empty or malformed files are errors.
pub async fn build_client(path: &Path) -> Result<Client> {
    let mut config = load_config(path).await?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config)
        .map_err(|e| Error::kubeconfig(path, format!("failed to create client: {}", e)))
}

/// Whether `path` names a non-empty file we can stat
pub fn usable_kubeconfig(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Config for the exec path, falling back to ambient discovery.
pub async fn exec_config(path: &Path) -> Result<Config> {
    if usable_kubeconfig(path) {
        return load_config(path).await;
    }

    warn!(
        path = %path.display(),
        "Kubeconfig not usable, falling back to default loading rules"
    );
    Config::infer()
        .await
        .map_err(|e| Error::kubeconfig(path, format!("failed to infer config: {}", e)))
}

/// Build the exec client. Read timeout is left to the transport default so
/// long-running commands are not cut off.
pub async fn build_exec_client(path: &Path) -> Result<Client> {
    let mut config = exec_config(path).await?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    Client::try_from(config)
        .map_err(|e| Error::kubeconfig(path, format!("failed to create exec client: {}", e)))
}
