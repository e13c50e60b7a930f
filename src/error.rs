//! Error types for the connectivity harness
//!
//! Every failure that reaches the top of a run is wrapped in [`Error::Stage`]
//! so the terminal message names the pipeline stage that broke.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Cluster creation, credentials, client construction
    Cluster,
    /// Mesh and endpoint install scripts
    Install,
    /// Client workload and service creation
    Deploy,
    /// Waiting for client pods to run
    Availability,
    /// Mesh address discovery
    Discovery,
    /// Pairwise probing
    Probe,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Cluster => "cluster",
            Stage::Install => "install",
            Stage::Deploy => "deploy",
            Stage::Availability => "availability",
            Stage::Discovery => "discovery",
            Stage::Probe => "probe",
        };
        f.write_str(name)
    }
}

/// Main error type for harness operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Local I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Credentials file could not be loaded
    #[error("kubeconfig error for {}: {message}", path.display())]
    Kubeconfig {
        /// Path that was being loaded
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// External command exited non-zero or could not be spawned
    #[error("command `{command}` failed: {message}")]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit status and stderr
        message: String,
    },

    /// Workload or service creation failed
    #[error("failed to create {kind} {name}: {message}")]
    Deploy {
        /// Resource kind (Deployment, Service)
        kind: &'static str,
        /// Resource name
        name: String,
        /// Underlying cause
        message: String,
    },

    /// Pods exist but are not all running yet
    #[error("pods not ready: {0}")]
    NotReady(String),

    /// Remote exec transport failure
    #[error("exec in {pod}/{container} failed: {message}")]
    Exec {
        /// Pod the command targeted
        pod: String,
        /// Container the command targeted
        container: String,
        /// Underlying cause
        message: String,
    },

    /// Remote command ran but did not succeed
    #[error("command in {pod}/{container} failed: {message}")]
    ExitStatus {
        /// Pod the command ran in
        pod: String,
        /// Container the command ran in
        container: String,
        /// Exit code, when the server reported one
        code: Option<i32>,
        /// Failure reason and stderr
        message: String,
    },

    /// Too few workloads have a mesh address to form a pair
    #[error("only {addressed} of {total} workloads have an address on {interface}")]
    MissingAddresses {
        /// Interface that was queried
        interface: String,
        /// Workloads with an address
        addressed: usize,
        /// Workloads queried
        total: usize,
    },

    /// One or more probe pairs failed
    #[error("{failed} of {total} probe pairs failed: {pairs}")]
    ProbeFailed {
        /// Number of failing pairs
        failed: usize,
        /// Number of pairs probed
        total: usize,
        /// Failing pairs rendered as `source -> target`
        pairs: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure tagged with the stage it happened in
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// Stage that failed
        stage: Stage,
        /// Underlying error
        source: Box<Error>,
    },
}

impl Error {
    /// Create a command failure for the given command line
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a kubeconfig error for the given path
    pub fn kubeconfig(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Kubeconfig {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a deploy error for a named resource
    pub fn deploy(kind: &'static str, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Deploy {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an exec error for a pod/container
    pub fn exec(
        pod: impl Into<String>,
        container: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Exec {
            pod: pod.into(),
            container: container.into(),
            message: message.into(),
        }
    }

    /// Create an exit-status error for a command that ran in pod/container
    pub fn exit_status(
        pod: impl Into<String>,
        container: impl Into<String>,
        code: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        Self::ExitStatus {
            pod: pod.into(),
            container: container.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Tag this error with a stage. Already-tagged errors keep their stage.
    pub fn at(self, stage: Stage) -> Self {
        match self {
            Error::Stage { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage this error was tagged with, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tag the error side of a `Result` with a pipeline stage.
pub trait StageExt<T> {
    /// Wrap any error in [`Error::Stage`]
    fn stage(self, stage: Stage) -> crate::Result<T>;
}

impl<T> StageExt<T> for crate::Result<T> {
    fn stage(self, stage: Stage) -> crate::Result<T> {
        self.map_err(|e| e.at(stage))
    }
}
