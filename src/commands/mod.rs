//! CLI commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::debug;

use crate::config::ScenarioConfig;
use crate::kind::KindCluster;
use crate::probe::ProbeMode;
use crate::process::ProcessRunner;
use crate::scenario::{KubeConnector, Scenario};
use crate::Result;

pub mod cluster;
pub mod probe;
pub mod run;

/// Scenario settings shared by `run` and `probe`.
///
/// Flags given on the command line override the config file, which
/// overrides the built-in defaults.
#[derive(Args, Debug, Default, Clone)]
pub struct ScenarioArgs {
    /// YAML scenario file
    #[arg(short = 'c', long = "config", env = "NSM_CONNCHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the kind cluster
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Value exported to install scripts as REMOTE_IP
    #[arg(long)]
    pub remote_ip: Option<String>,

    /// Mesh install script
    #[arg(long)]
    pub nsm_path: Option<String>,

    /// Endpoint install script
    #[arg(long)]
    pub nse_path: Option<String>,

    /// Namespace for the client workloads
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Client replica count
    #[arg(long)]
    pub replicas: Option<i32>,

    /// Attempts for availability polling and each probe pair
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Pairs probed at once
    #[arg(long)]
    pub probe_concurrency: Option<usize>,

    /// Probe `helloworld.<cluster>.<domain>` instead of peer addresses
    #[arg(long)]
    pub remote_cluster: Option<String>,

    /// Delete the cluster when the run ends
    #[arg(long)]
    pub teardown: bool,

    /// Cluster tool binary
    #[arg(long)]
    pub cluster_tool: Option<String>,
}

impl ScenarioArgs {
    /// Apply explicit flags on top of `config`
    pub fn apply(&self, config: &mut ScenarioConfig) {
        if let Some(v) = &self.cluster_name {
            config.cluster_name = v.clone();
        }
        if let Some(v) = &self.remote_ip {
            config.remote_ip = v.clone();
        }
        if let Some(v) = &self.nsm_path {
            config.mesh_install_script = v.clone();
        }
        if let Some(v) = &self.nse_path {
            config.endpoint_install_script = v.clone();
        }
        if let Some(v) = &self.namespace {
            config.workload.namespace = v.clone();
        }
        if let Some(v) = self.replicas {
            config.workload.replicas = v;
        }
        if let Some(v) = self.retry_attempts {
            config.retry.attempts = v;
        }
        if let Some(v) = self.probe_concurrency {
            config.probe_concurrency = v;
        }
        if let Some(cluster) = &self.remote_cluster {
            config.probe_mode = ProbeMode::RemoteDns {
                cluster: cluster.clone(),
            };
        }
        if self.teardown {
            config.teardown = true;
        }
        if let Some(v) = &self.cluster_tool {
            config.cluster_tool = v.clone();
        }
    }

    /// Defaults, then the config file, then flags; validated
    pub fn resolve(&self) -> Result<ScenarioConfig> {
        let mut config = ScenarioConfig::load_or_default(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        debug!(?config, "Resolved scenario config");
        Ok(config)
    }
}

/// Wire a scenario to real processes and kube clients
pub fn build_scenario(config: ScenarioConfig) -> Scenario {
    let runner = Arc::new(ProcessRunner::new());
    let provisioner = Arc::new(KindCluster::new(
        ProcessRunner::new(),
        config.cluster_tool.clone(),
        config.output_dir.clone(),
    ));
    Scenario::new(config, provisioner, runner, Arc::new(KubeConnector))
}
