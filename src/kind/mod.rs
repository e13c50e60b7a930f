//! Ephemeral test cluster lifecycle
//!
//! Shells out to the kind CLI. [`ClusterProvisioner::ensure_cluster`] is
//! idempotent under re-creation: a cluster with the same name is deleted
//! before a fresh one is created, so running it twice leaves exactly one
//! cluster behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::info;

use crate::process::{CommandRunner, CommandSpec};
use crate::{Error, Result};

/// Default cluster tool binary
pub const DEFAULT_CLUSTER_TOOL: &str = "kind";

/// Suffix of the credentials file written next to the working directory
pub const KUBECONFIG_SUFFIX: &str = ".kubeconfig";

/// A named ephemeral cluster, plus its credentials file once fetched
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterHandle {
    name: String,
    kubeconfig: Option<PathBuf>,
}

impl ClusterHandle {
    /// Handle for a cluster without materialized credentials
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kubeconfig: None,
        }
    }

    /// Attach the credentials file path
    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Cluster name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Credentials file, if fetched
    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    /// Credentials file, or an error when it was never fetched
    pub fn credentials(&self) -> Result<&Path> {
        self.kubeconfig().ok_or_else(|| {
            Error::config(format!("credentials for cluster {} were not fetched", self.name))
        })
    }
}

/// Creates, inspects and deletes test clusters.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterProvisioner: Send + Sync {
    /// Delete any cluster with this name, then create a fresh one
    async fn ensure_cluster(&self, name: &str) -> Result<ClusterHandle>;

    /// Write the cluster's admin kubeconfig to disk; the returned handle owns its path
    async fn fetch_credentials(&self, cluster: &ClusterHandle) -> Result<ClusterHandle>;

    /// Delete the cluster
    async fn delete_cluster(&self, name: &str) -> Result<()>;
}

/// [`ClusterProvisioner`] that drives the kind CLI through a [`CommandRunner`]
pub struct KindCluster<R> {
    runner: R,
    binary: String,
    output_dir: PathBuf,
}

impl<R: CommandRunner> KindCluster<R> {
    /// Create a provisioner writing credentials into `output_dir`
    pub fn new(runner: R, binary: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: binary.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create a provisioner writing credentials into the current directory
    pub fn in_current_dir(runner: R, binary: impl Into<String>) -> Result<Self> {
        Ok(Self::new(runner, binary, std::env::current_dir()?))
    }

    /// Credentials file path for a cluster name
    pub fn kubeconfig_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", name, KUBECONFIG_SUFFIX))
    }

    fn cluster_command(&self, action: &str, name: &str) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .args([action, "cluster"])
            .arg(format!("--name={}", name))
    }

    /// Names of all existing clusters
    pub async fn list_clusters(&self) -> Result<Vec<String>> {
        let output = self
            .runner
            .run(&CommandSpec::new(&self.binary).args(["get", "clusters"]))
            .await?;
        Ok(output
            .stdout
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    async fn remove_existing(&self, name: &str) -> Result<()> {
        let clusters = self.list_clusters().await?;
        if clusters.iter().any(|c| c == name) {
            info!(cluster = %name, "Deleting existing cluster");
            self.runner.run(&self.cluster_command("delete", name)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<R: CommandRunner> ClusterProvisioner for KindCluster<R> {
    async fn ensure_cluster(&self, name: &str) -> Result<ClusterHandle> {
        if name.is_empty() {
            return Err(Error::config("cluster name must not be empty"));
        }
        self.remove_existing(name).await?;

        info!(cluster = %name, "Creating cluster");
        self.runner.run(&self.cluster_command("create", name)).await?;
        Ok(ClusterHandle::new(name))
    }

    async fn fetch_credentials(&self, cluster: &ClusterHandle) -> Result<ClusterHandle> {
        let output = self
            .runner
            .run(
                &CommandSpec::new(&self.binary)
                    .args(["get", "kubeconfig"])
                    .arg(format!("--name={}", cluster.name())),
            )
            .await?;

        let path = self.kubeconfig_path(cluster.name());
        tokio::fs::write(&path, output.stdout.as_bytes()).await?;
        info!(cluster = %cluster.name(), path = %path.display(), "Wrote kubeconfig");
        Ok(cluster.clone().with_kubeconfig(path))
    }

    async fn delete_cluster(&self, name: &str) -> Result<()> {
        info!(cluster = %name, "Deleting cluster");
        self.runner.run(&self.cluster_command("delete", name)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, MockCommandRunner};
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// In-memory stand-in for the kind CLI.
    ///
    /// Tracks which clusters exist and fails `create` for a name that is
    /// already taken, like the real tool.
    #[derive(Default)]
    struct FakeKind {
        clusters: Mutex<BTreeSet<String>>,
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommandRunner for FakeKind {
        async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
            self.log.lock().unwrap().push(command.to_string());
            let mut clusters = self.clusters.lock().unwrap();
            let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
            fn name_of(flag: &str) -> String {
                flag.trim_start_matches("--name=").to_string()
            }

            match args.as_slice() {
                ["get", "clusters"] => Ok(CommandOutput {
                    stdout: clusters.iter().map(|c| format!("{}\n", c)).collect(),
                    stderr: String::new(),
                }),
                ["create", "cluster", flag] => {
                    if !clusters.insert(name_of(flag)) {
                        return Err(Error::command_failed(command.to_string(), "already exists"));
                    }
                    Ok(CommandOutput::default())
                }
                ["delete", "cluster", flag] => {
                    clusters.remove(&name_of(flag));
                    Ok(CommandOutput::default())
                }
                ["get", "kubeconfig", flag] => Ok(CommandOutput {
                    stdout: format!("apiVersion: v1\nclusters:\n- name: kind-{}\n", name_of(flag)),
                    stderr: String::new(),
                }),
                _ => Err(Error::command_failed(command.to_string(), "unknown")),
            }
        }
    }

    // ==========================================================================
    // Story: Ensuring a cluster is idempotent under re-creation
    // ==========================================================================

    #[tokio::test]
    async fn ensure_twice_leaves_exactly_one_cluster() {
        let kind = KindCluster::new(FakeKind::default(), "kind", ".");

        kind.ensure_cluster("t1").await.unwrap();
        kind.ensure_cluster("t1").await.unwrap();
        let log = kind.runner.log.lock().unwrap().clone();

        let clusters = kind.list_clusters().await.unwrap();
        assert_eq!(clusters, vec!["t1".to_string()]);

        assert_eq!(
            log,
            vec![
                "kind get clusters",
                "kind create cluster --name=t1",
                "kind get clusters",
                "kind delete cluster --name=t1",
                "kind create cluster --name=t1",
            ]
        );
    }

    #[tokio::test]
    async fn ensure_leaves_other_clusters_alone() {
        let kind = KindCluster::new(FakeKind::default(), "kind", ".");
        kind.ensure_cluster("other").await.unwrap();
        kind.ensure_cluster("t1").await.unwrap();

        let clusters = kind.list_clusters().await.unwrap();
        assert_eq!(clusters, vec!["other".to_string(), "t1".to_string()]);
    }

    #[tokio::test]
    async fn similar_names_are_not_confused() {
        let kind = KindCluster::new(FakeKind::default(), "kind", ".");
        kind.ensure_cluster("t10").await.unwrap();
        kind.ensure_cluster("t1").await.unwrap();

        let log = kind.runner.log.lock().unwrap().clone();
        assert!(!log.iter().any(|l| l.starts_with("kind delete")));
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let kind = KindCluster::new(MockCommandRunner::new(), "kind", ".");
        let err = kind.ensure_cluster("").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    // ==========================================================================
    // Story: Tool failures propagate
    // ==========================================================================

    #[tokio::test]
    async fn failed_delete_aborts_before_create() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|c| c.args == ["get", "clusters"])
            .times(1)
            .returning(|_| {
                Ok(CommandOutput {
                    stdout: "t1\n".into(),
                    stderr: String::new(),
                })
            });
        runner
            .expect_run()
            .withf(|c| c.args.first().map(String::as_str) == Some("delete"))
            .times(1)
            .returning(|c| Err(Error::command_failed(c.to_string(), "exit status: 1")));
        runner
            .expect_run()
            .withf(|c| c.args.first().map(String::as_str) == Some("create"))
            .never();

        let kind = KindCluster::new(runner, "kind", ".");
        let err = kind.ensure_cluster("t1").await.unwrap_err();
        assert!(err.to_string().contains("kind delete cluster --name=t1"));
    }

    #[tokio::test]
    async fn failed_listing_is_propagated() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|c| Err(Error::command_failed(c.to_string(), "docker not running")));

        let kind = KindCluster::new(runner, "kind", ".");
        let err = kind.ensure_cluster("t1").await.unwrap_err();
        assert!(err.to_string().contains("docker not running"));
    }

    #[tokio::test]
    async fn custom_binary_is_used() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|c| c.program == "/opt/bin/kind")
            .times(2)
            .returning(|_| Ok(CommandOutput::default()));

        let kind = KindCluster::new(runner, "/opt/bin/kind", ".");
        kind.ensure_cluster("t1").await.unwrap();
    }

    // ==========================================================================
    // Story: Credentials land in <name>.kubeconfig
    // ==========================================================================

    #[tokio::test]
    async fn credentials_are_written_to_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let kind = KindCluster::new(FakeKind::default(), "kind", dir.path());

        let handle = kind
            .fetch_credentials(&ClusterHandle::new("t1"))
            .await
            .unwrap();

        assert_eq!(handle.name(), "t1");
        let path = handle.credentials().unwrap();
        assert_eq!(path, dir.path().join("t1.kubeconfig"));
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.contains("name: kind-t1"));
    }

    #[tokio::test]
    async fn credentials_overwrite_an_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("t1.kubeconfig");
        std::fs::write(&stale, "stale contents that are much longer than the new ones").unwrap();

        let kind = KindCluster::new(FakeKind::default(), "kind", dir.path());
        kind.fetch_credentials(&ClusterHandle::new("t1"))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&stale).unwrap();
        assert!(!contents.contains("stale"));
    }

    #[tokio::test]
    async fn credential_fetch_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|c| Err(Error::command_failed(c.to_string(), "no such cluster")));

        let kind = KindCluster::new(runner, "kind", dir.path());
        assert!(kind
            .fetch_credentials(&ClusterHandle::new("t1"))
            .await
            .is_err());
        assert!(!dir.path().join("t1.kubeconfig").exists());
    }

    #[test]
    fn unfetched_handle_has_no_credentials() {
        let handle = ClusterHandle::new("t1");
        assert_eq!(handle.kubeconfig(), None);
        assert!(matches!(handle.credentials(), Err(Error::Config(_))));
    }
}
