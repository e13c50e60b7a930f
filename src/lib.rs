//! Service-mesh connectivity checks on ephemeral kind clusters
//!
//! Creates a kind cluster, installs the mesh and its endpoints with external
//! scripts, deploys a set of client workloads, then verifies that every pair
//! of clients can reach each other over the mesh-assigned interface.
//!
//! # Modules
//!
//! - [`kind`] - Ephemeral cluster lifecycle through the kind CLI
//! - [`kube_utils`] - Kube clients from a stored kubeconfig
//! - [`process`] - External command execution
//! - [`retry`] - Quadratic-backoff retry executor
//! - [`exec`] - Commands inside running containers
//! - [`discovery`] - Mesh address discovery
//! - [`workload`] - Client Deployment, Service and availability
//! - [`probe`] - Pairwise probing and the probe report
//! - [`scenario`] - The end-to-end pipeline
//! - [`config`] - Scenario configuration
//! - [`commands`] - CLI commands

pub mod commands;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exec;
pub mod kind;
pub mod kube_utils;
pub mod probe;
pub mod process;
pub mod retry;
pub mod scenario;
pub mod workload;

pub use error::{Error, Stage, StageExt};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

use clap::{Parser, Subcommand};

/// nsm-conncheck - service-mesh connectivity checks on kind clusters
#[derive(Parser, Debug)]
#[command(name = "nsm-conncheck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a cluster, install the mesh, deploy clients and probe every pair
    Run(commands::run::RunArgs),
    /// Create or delete the ephemeral cluster
    Cluster(commands::cluster::ClusterArgs),
    /// Probe clients already running in an existing cluster
    Probe(commands::probe::ProbeArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args).await,
            Commands::Cluster(args) => commands::cluster::run(args).await,
            Commands::Probe(args) => commands::probe::run(args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cluster::ClusterCommand;
    use std::path::PathBuf;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_scenario_flags() {
        let cli = Cli::try_parse_from([
            "nsm-conncheck",
            "run",
            "--cluster-name",
            "test-2",
            "--remote-ip",
            "172.18.0.3",
            "--nsm-path",
            "/nse/install.sh",
            "--teardown",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.scenario.cluster_name.as_deref(), Some("test-2"));
                assert_eq!(args.scenario.remote_ip.as_deref(), Some("172.18.0.3"));
                assert_eq!(args.scenario.nsm_path.as_deref(), Some("/nse/install.sh"));
                assert!(args.scenario.teardown);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn cluster_create_defaults() {
        let cli = Cli::try_parse_from(["nsm-conncheck", "cluster", "create"]).unwrap();
        match cli.command {
            Commands::Cluster(args) => match args.command {
                ClusterCommand::Create(t) => {
                    assert_eq!(t.name, "test-1");
                    assert_eq!(t.tool, "kind");
                    assert_eq!(t.output_dir, PathBuf::from("."));
                }
                other => panic!("expected create, got {:?}", other),
            },
            other => panic!("expected cluster, got {:?}", other),
        }
    }

    #[test]
    fn probe_requires_a_kubeconfig() {
        assert!(Cli::try_parse_from(["nsm-conncheck", "probe"]).is_err());
        let cli =
            Cli::try_parse_from(["nsm-conncheck", "probe", "-k", "test-1.kubeconfig"]).unwrap();
        assert!(matches!(cli.command, Commands::Probe(_)));
    }
}
