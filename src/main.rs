//! nsm-conncheck CLI
//!
//! Service-mesh connectivity checks on ephemeral kind clusters.

use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nsm_conncheck::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        error!(error = %e, "Run failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
