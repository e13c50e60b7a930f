//! Probe command - check an already deployed client set
//!
//! Usage: nsm-conncheck probe --kubeconfig test-1.kubeconfig

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use super::{build_scenario, ScenarioArgs};
use crate::Result;

/// Probe existing client workloads without creating anything
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Kubeconfig of the cluster running the clients
    #[arg(short = 'k', long = "kubeconfig")]
    pub kubeconfig: PathBuf,

    #[command(flatten)]
    pub scenario: ScenarioArgs,
}

pub async fn run(args: ProbeArgs) -> Result<()> {
    let config = args.scenario.resolve()?;
    info!(kubeconfig = %args.kubeconfig.display(), "Probing existing clients");

    let report = build_scenario(config).verify(&args.kubeconfig).await?;
    info!(pairs = report.total(), "Connectivity verified");
    Ok(())
}
