//! End-to-end connectivity scenario
//!
//! A linear pipeline, every step tagged with the [`Stage`] it belongs to:
//!
//! 1. cluster: ensure a fresh cluster, fetch credentials, build clients
//! 2. install: mesh and endpoint install scripts
//! 3. deploy: client Deployment and Service
//! 4. availability: retried until every replica is running
//! 5. discovery: mesh address of every client pod
//! 6. probe: every unordered pair, each pair retried on its own
//!
//! The first failing step aborts the run. The cluster is left behind unless
//! teardown is enabled.

mod session;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ScenarioConfig;
use crate::discovery::{discover_targets, ensure_addressed, AddressExtractor};
use crate::error::{Stage, StageExt};
use crate::kind::ClusterProvisioner;
use crate::probe::{run_probes, ProbePlan, ProbeReport};
use crate::process::{CommandRunner, CommandSpec};
use crate::retry::retry;
use crate::workload::{check_availability, deploy_clients};
use crate::Result;

pub use session::{ClusterSession, Connector, KubeConnector};

#[cfg(test)]
pub use session::MockConnector;

/// Environment variable carrying the credentials path to install scripts
pub const KCONF_ENV: &str = "KCONF";
/// Environment variable carrying the remote IP to install scripts
pub const REMOTE_IP_ENV: &str = "REMOTE_IP";

/// A configured connectivity run and the collaborators it drives
pub struct Scenario {
    config: ScenarioConfig,
    provisioner: Arc<dyn ClusterProvisioner>,
    runner: Arc<dyn CommandRunner>,
    connector: Arc<dyn Connector>,
}

impl Scenario {
    pub fn new(
        config: ScenarioConfig,
        provisioner: Arc<dyn ClusterProvisioner>,
        runner: Arc<dyn CommandRunner>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            provisioner,
            runner,
            connector,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Run the whole pipeline against a fresh cluster
    pub async fn run(&self) -> Result<ProbeReport> {
        let name = &self.config.cluster_name;
        info!(cluster = %name, "Creating cluster");
        let cluster = self
            .provisioner
            .ensure_cluster(name)
            .await
            .stage(Stage::Cluster)?;

        let result = self.run_on(&cluster).await;

        if self.config.teardown {
            let teardown = self.teardown().await;
            if let Err(e) = teardown {
                warn!(cluster = %name, error = %e, "Teardown failed");
                if result.is_ok() {
                    return Err(e);
                }
            }
        }

        result
    }

    async fn run_on(&self, cluster: &crate::kind::ClusterHandle) -> Result<ProbeReport> {
        info!(cluster = %cluster.name(), "Fetching kubeconfig");
        let cluster = self
            .provisioner
            .fetch_credentials(cluster)
            .await
            .stage(Stage::Cluster)?;
        let kubeconfig = cluster.credentials().stage(Stage::Cluster)?;
        let session = self
            .connector
            .connect(kubeconfig)
            .await
            .stage(Stage::Cluster)?;

        self.install(kubeconfig).await.stage(Stage::Install)?;

        deploy_clients(session.workloads.as_ref(), &self.config.workload)
            .await
            .stage(Stage::Deploy)?;

        verify_connectivity(&session, &self.config).await
    }

    /// Availability, discovery and probing against an already deployed client set
    pub async fn verify(&self, kubeconfig: &Path) -> Result<ProbeReport> {
        let session = self
            .connector
            .connect(kubeconfig)
            .await
            .stage(Stage::Cluster)?;
        verify_connectivity(&session, &self.config).await
    }

    /// Run both install scripts, mesh first
    async fn install(&self, kubeconfig: &Path) -> Result<()> {
        let scripts = [
            ("mesh", &self.config.mesh_install_script),
            ("endpoints", &self.config.endpoint_install_script),
        ];
        for (what, script) in scripts {
            info!(script = %script, "Installing {}", what);
            let command = CommandSpec::shell(script.as_str())
                .env(KCONF_ENV, kubeconfig.display().to_string())
                .env(REMOTE_IP_ENV, self.config.remote_ip.as_str());
            self.runner.run(&command).await?;
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<()> {
        let name = &self.config.cluster_name;
        info!(cluster = %name, "Deleting cluster");
        self.provisioner
            .delete_cluster(name)
            .await
            .stage(Stage::Cluster)
    }
}

/// Wait for the client pods, discover their addresses and probe every pair.
pub async fn verify_connectivity(
    session: &ClusterSession,
    config: &ScenarioConfig,
) -> Result<ProbeReport> {
    let policy = config.retry.policy();
    let workloads = session.workloads.as_ref();

    info!("Checking if all client pods are available");
    let pods = retry(&policy, "pods_running", || {
        check_availability(workloads, &config.workload)
    })
    .await
    .stage(Stage::Availability)?;
    info!(pods = pods.len(), "Client pods are running");

    let extractor = AddressExtractor::new().stage(Stage::Discovery)?;
    let targets = discover_targets(
        session.exec.as_ref(),
        &extractor,
        &pods,
        &config.probe.interface,
    )
    .await
    .stage(Stage::Discovery)?;
    ensure_addressed(&targets, &config.probe.interface, pods.len().min(2))
        .stage(Stage::Discovery)?;

    let plan = ProbePlan {
        spec: config.probe.clone(),
        mode: config.probe_mode.clone(),
        retry: policy,
        concurrency: config.probe_concurrency,
    };
    let report = run_probes(session.exec.as_ref(), &targets, &plan).await;
    report.log_summary();
    report.finish().stage(Stage::Probe)?;

    Ok(report)
}
