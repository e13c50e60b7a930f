//! Cluster command - create or delete the ephemeral kind cluster on its own
//!
//! Usage:
//!   nsm-conncheck cluster create --name test-1
//!   nsm-conncheck cluster delete --name test-1

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::info;

use crate::kind::{ClusterProvisioner, KindCluster, DEFAULT_CLUSTER_TOOL};
use crate::process::ProcessRunner;
use crate::Result;

/// Manage the ephemeral cluster
#[derive(Args, Debug)]
pub struct ClusterArgs {
    #[command(subcommand)]
    pub command: ClusterCommand,
}

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Recreate the cluster and write its kubeconfig
    Create(ClusterTarget),
    /// Delete the cluster
    Delete(ClusterTarget),
}

#[derive(Args, Debug)]
pub struct ClusterTarget {
    /// Cluster name
    #[arg(long, default_value = "test-1")]
    pub name: String,

    /// Cluster tool binary
    #[arg(long, default_value = DEFAULT_CLUSTER_TOOL)]
    pub tool: String,

    /// Directory the kubeconfig is written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

impl ClusterTarget {
    fn provisioner(&self) -> KindCluster<ProcessRunner> {
        KindCluster::new(ProcessRunner::new(), self.tool.clone(), self.output_dir.clone())
    }
}

pub async fn run(args: ClusterArgs) -> Result<()> {
    match args.command {
        ClusterCommand::Create(target) => create(&target, &target.provisioner()).await,
        ClusterCommand::Delete(target) => delete(&target, &target.provisioner()).await,
    }
}

async fn create<P>(target: &ClusterTarget, provisioner: &P) -> Result<()>
where
    P: ClusterProvisioner + ?Sized,
{
    let handle = provisioner.ensure_cluster(&target.name).await?;
    let handle = provisioner.fetch_credentials(&handle).await?;
    let kubeconfig = handle.credentials()?;
    info!(cluster = %handle.name(), kubeconfig = %kubeconfig.display(), "Cluster ready");
    println!("{}", kubeconfig.display());
    Ok(())
}

async fn delete<P>(target: &ClusterTarget, provisioner: &P) -> Result<()>
where
    P: ClusterProvisioner + ?Sized,
{
    provisioner.delete_cluster(&target.name).await?;
    info!(cluster = %target.name, "Cluster deleted");
    Ok(())
}
