//! Shared fixtures for kind integration tests

use std::path::Path;

use nsm_conncheck::kind::KindCluster;
use nsm_conncheck::process::ProcessRunner;
use tracing_subscriber::EnvFilter;

/// Route harness logs through the test writer
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Whether the kind binary can be invoked
pub fn kind_available() -> bool {
    std::process::Command::new("kind")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Per-test cluster name so tests can run side by side
pub fn cluster_name(suffix: &str) -> String {
    format!("nsm-conncheck-{}", suffix)
}

/// kind provisioner writing credentials into `dir`
pub fn provisioner(dir: &Path) -> KindCluster<ProcessRunner> {
    KindCluster::new(ProcessRunner::new(), "kind", dir)
}
