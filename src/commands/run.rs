//! Run command - full connectivity scenario
//!
//! Usage: nsm-conncheck run [--config scenario.yaml] [--cluster-name test-1]
//!
//! 1. Recreates the kind cluster and writes `<name>.kubeconfig`
//! 2. Runs the mesh and endpoint install scripts
//! 3. Deploys the client workloads and their service
//! 4. Waits for every client pod to run
//! 5. Discovers mesh addresses and probes every pair

use clap::Args;
use tracing::info;

use super::{build_scenario, ScenarioArgs};
use crate::Result;

/// Run the full connectivity scenario
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub scenario: ScenarioArgs,
}

pub async fn run(args: RunArgs) -> Result<()> {
    let config = args.scenario.resolve()?;
    info!(cluster = %config.cluster_name, "Starting connectivity run");

    let report = build_scenario(config).run().await?;
    info!(
        pairs = report.total(),
        "Connectivity verified across all client pairs"
    );
    Ok(())
}
