//! Scenario configuration
//!
//! Defaults first, then an optional YAML file, then explicit CLI flags
//! (applied by the command layer), then [`ScenarioConfig::validate`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::{ProbeMode, ProbeSpec};
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::workload::ClientWorkload;
use crate::{Error, Result};

/// Overrides the directory install scripts are resolved against
pub const BASE_DIR_ENV: &str = "NSM_NSE_DIR";

const NSM_NSE_REPO: &str = "src/github.com/cisco-app-networking/nsm-nse";
const MESH_INSTALL_SCRIPT: &str = "scripts/vl3/nsm_install_interdomain.sh";
const ENDPOINT_INSTALL_SCRIPT: &str = "scripts/vl3/vl3_interdomain.sh";

/// Resolve the script base directory.
///
/// `NSM_NSE_DIR` wins; otherwise the repo under `GOPATH`, with Go's own
/// `$HOME/go` fallback when `GOPATH` is unset.
pub fn resolve_base_dir(
    override_dir: Option<String>,
    gopath: Option<String>,
    home: Option<String>,
) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    let gopath = gopath
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.map(|h| Path::new(&h).join("go")))
        .unwrap_or_default();
    gopath.join(NSM_NSE_REPO)
}

/// Script base directory from the process environment
pub fn default_base_dir() -> PathBuf {
    resolve_base_dir(
        std::env::var(BASE_DIR_ENV).ok(),
        std::env::var("GOPATH").ok(),
        std::env::var("HOME").ok(),
    )
}

/// Retry budget as it appears in configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    /// Attempts per retried step
    pub attempts: u32,
    /// Backoff unit in milliseconds
    pub unit_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_MAX_ATTEMPTS,
            unit_ms: 1000,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts,
            unit: Duration::from_millis(self.unit_ms),
        }
    }
}

/// Every tunable of a connectivity run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScenarioConfig {
    /// Ephemeral cluster name
    pub cluster_name: String,
    /// Exported to install scripts as `REMOTE_IP`
    pub remote_ip: String,
    /// Shell command installing the mesh
    pub mesh_install_script: String,
    /// Shell command installing the endpoints
    pub endpoint_install_script: String,
    /// Client workload set
    pub workload: ClientWorkload,
    /// Probe URL pieces and the mesh interface
    pub probe: ProbeSpec,
    /// Direct IP or remote DNS probing
    pub probe_mode: ProbeMode,
    /// Retry budget for availability and each probe pair
    pub retry: RetrySettings,
    /// Pairs probed at once
    pub probe_concurrency: usize,
    /// Delete the cluster when the run ends
    pub teardown: bool,
    /// Cluster tool binary
    pub cluster_tool: String,
    /// Directory the credentials file is written to
    pub output_dir: PathBuf,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::with_base_dir(&default_base_dir())
    }
}

impl ScenarioConfig {
    /// Defaults with install scripts resolved against `base`
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            cluster_name: "test-1".to_string(),
            remote_ip: "127.0.0.1".to_string(),
            mesh_install_script: base.join(MESH_INSTALL_SCRIPT).display().to_string(),
            endpoint_install_script: format!(
                "{} --pass-through",
                base.join(ENDPOINT_INSTALL_SCRIPT).display()
            ),
            workload: ClientWorkload::default(),
            probe: ProbeSpec::default(),
            probe_mode: ProbeMode::default(),
            retry: RetrySettings::default(),
            probe_concurrency: 1,
            teardown: false,
            cluster_tool: crate::kind::DEFAULT_CLUSTER_TOOL.to_string(),
            output_dir: PathBuf::from("."),
        }
    }

    /// Parse YAML; absent keys keep their defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Defaults, or the file's contents when a path is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Reject settings no run can succeed with
    pub fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            return Err(Error::config("cluster name must not be empty"));
        }
        if self.workload.replicas < 1 {
            return Err(Error::config(format!(
                "replicas must be at least 1, got {}",
                self.workload.replicas
            )));
        }
        if self.retry.attempts < 1 {
            return Err(Error::config("retry attempts must be at least 1"));
        }
        if self.probe_concurrency < 1 {
            return Err(Error::config("probe concurrency must be at least 1"));
        }
        if self.probe.interface.trim().is_empty() {
            return Err(Error::config("probe interface must not be empty"));
        }
        if self.probe.port == 0 {
            return Err(Error::config("probe port must not be 0"));
        }
        if i32::from(self.probe.port) != self.workload.port {
            return Err(Error::config(format!(
                "probe port {} does not match workload port {}",
                self.probe.port, self.workload.port
            )));
        }
        if let ProbeMode::RemoteDns { cluster } = &self.probe_mode {
            if cluster.trim().is_empty() {
                return Err(Error::config("remote DNS probing needs a cluster name"));
            }
        }
        Ok(())
    }
}
