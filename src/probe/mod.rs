//! Pairwise connectivity probing
//!
//! Every unordered pair `(i, j)` with `i < j` of addressed targets is probed
//! once, from `i` toward `j`, with an HTTP fetch run inside `i`'s container.
//! Each pair retries independently and every outcome is recorded, so the run
//! passes only when all pairs pass.

mod report;

use std::net::Ipv4Addr;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::exec::{RemoteExec, WorkloadRef};
use crate::retry::{retry, RetryPolicy};

pub use report::{PairOutcome, ProbeReport};

/// Interface, port and path the probe is built from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProbeSpec {
    /// Mesh interface queried for each workload's address
    pub interface: String,
    /// Port the client workload serves on
    pub port: u16,
    /// HTTP path fetched by the probe
    pub path: String,
    /// Host label used in remote-cluster DNS names
    pub remote_host: String,
    /// Domain suffix used in remote-cluster DNS names
    pub remote_domain: String,
}

impl Default for ProbeSpec {
    fn default() -> Self {
        Self {
            interface: "nsm0".to_string(),
            port: 5000,
            path: "/hello".to_string(),
            remote_host: "helloworld".to_string(),
            remote_domain: "wcm-cisco.com".to_string(),
        }
    }
}

/// Where a probe is aimed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProbeMode {
    /// The peer's discovered mesh address
    #[default]
    Ip,
    /// A DNS name scoped to a remote cluster
    RemoteDns {
        /// Remote cluster name used in the DNS name
        cluster: String,
    },
}

/// A workload and its discovered mesh address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    /// The workload
    pub workload: WorkloadRef,
    /// Mesh address; `None` when discovery found nothing
    pub address: Option<Ipv4Addr>,
}

impl ProbeTarget {
    /// Pod name, used to label pairs
    pub fn name(&self) -> &str {
        &self.workload.pod
    }
}

/// Everything a probe run needs besides the targets
#[derive(Clone, Debug)]
pub struct ProbePlan {
    /// URL construction
    pub spec: ProbeSpec,
    /// Direct IP or remote DNS
    pub mode: ProbeMode,
    /// Per-pair retry budget
    pub retry: RetryPolicy,
    /// Maximum pairs in flight
    pub concurrency: usize,
}

impl ProbePlan {
    /// URL fetched when probing `target`
    pub fn url_for(&self, address: Ipv4Addr) -> String {
        match &self.mode {
            ProbeMode::Ip => {
                format!("http://{}:{}{}", address, self.spec.port, self.spec.path)
            }
            ProbeMode::RemoteDns { cluster } => format!(
                "http://{}.{}.{}:{}{}",
                self.spec.remote_host,
                cluster,
                self.spec.remote_domain,
                self.spec.port,
                self.spec.path
            ),
        }
    }
}

/// `curl -v <url>`
pub fn probe_command(url: &str) -> Vec<String> {
    vec!["curl".to_string(), "-v".to_string(), url.to_string()]
}

/// Index pairs `(i, j)` with `i < j` over `n` items
pub fn pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect()
}

/// Probe every pair of addressed targets and collect the outcomes.
///
/// Targets without an address are skipped; with fewer than two addressed
/// targets no probe is issued.
pub async fn run_probes<E: RemoteExec + ?Sized>(
    exec: &E,
    targets: &[ProbeTarget],
    plan: &ProbePlan,
) -> ProbeReport {
    let addressed: Vec<(&ProbeTarget, Ipv4Addr)> = targets
        .iter()
        .filter_map(|t| t.address.map(|ip| (t, ip)))
        .collect();

    let skipped = targets.len() - addressed.len();
    if skipped > 0 {
        warn!(skipped, "Skipping workloads without a mesh address");
    }

    let pairs = pairs(addressed.len());
    info!(
        targets = addressed.len(),
        pairs = pairs.len(),
        concurrency = plan.concurrency,
        "Probing connectivity"
    );

    let outcomes: Vec<PairOutcome> = stream::iter(pairs)
        .map(|(i, j)| {
            let (source, _) = addressed[i];
            let (target, address) = addressed[j];
            probe_pair(exec, source, target, address, plan)
        })
        .buffered(plan.concurrency.max(1))
        .collect()
        .await;

    ProbeReport::new(outcomes)
}

async fn probe_pair<E: RemoteExec + ?Sized>(
    exec: &E,
    source: &ProbeTarget,
    target: &ProbeTarget,
    address: Ipv4Addr,
    plan: &ProbePlan,
) -> PairOutcome {
    let url = plan.url_for(address);
    let command = probe_command(&url);
    let command: &[String] = &command;
    let workload = &source.workload;
    let operation = format!("probe {} -> {}", source.name(), target.name());

    let start = Instant::now();
    let mut attempts = 0u32;
    let result = retry(&plan.retry, &operation, || {
        attempts += 1;
        async move { exec.exec_in(workload, command).await }
    })
    .await;

    let duration: Duration = start.elapsed();
    match result {
        Ok(output) => {
            info!(
                source = %source.name(),
                target = %target.name(),
                %url,
                attempts,
                "Probe passed"
            );
            debug!(stdout = %output.stdout, stderr = %output.stderr, "Probe output");
            PairOutcome::passed(source.name(), target.name(), attempts, duration)
        }
        Err(e) => {
            warn!(
                source = %source.name(),
                target = %target.name(),
                %url,
                error = %e,
                "Probe failed"
            );
            PairOutcome::failed(source.name(), target.name(), attempts, duration, e.to_string())
        }
    }
}
