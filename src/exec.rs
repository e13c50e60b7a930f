//! Command execution inside running containers
//!
//! Uses the pod `exec` sub-resource over a multiplexed websocket, with
//! stdout and stderr on separate channels of the one connection. The
//! status the API server sends on the error channel decides the result: a
//! command that exits non-zero is an [`Error::ExitStatus`] carrying its exit
//! code and stderr. Transport problems stay [`Error::Exec`].

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::{Error, Result};

/// A running container instance
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    /// Pod namespace
    pub namespace: String,
    /// Pod name
    pub pod: String,
    /// Container within the pod
    pub container: String,
}

impl WorkloadRef {
    /// Create a reference to `namespace/pod`, container `container`
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod)
    }
}

/// Captured output of a remote command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

/// Runs commands inside containers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` in the target container and capture both output streams
    async fn exec_in(&self, target: &WorkloadRef, command: &[String]) -> Result<ExecOutput>;
}

/// [`RemoteExec`] over the Kubernetes API
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
}

impl KubeExecutor {
    /// Create an executor using the given exec client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Attach parameters for a non-interactive exec with both output streams
fn attach_params(container: &str) -> AttachParams {
    AttachParams::default()
        .container(container)
        .stdin(false)
        .stdout(true)
        .stderr(true)
        .tty(false)
}

/// Drain a stream to a string. A missing stream reads as empty.
async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn with_stderr(failure: String, stderr: &str) -> String {
    match stderr.trim() {
        "" => failure,
        tail => format!("{}: {}", failure, tail),
    }
}

/// Exit code carried in an exec status, if the server reported one
fn exit_code(status: &Status) -> Option<i32> {
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|c| c.reason.as_deref() == Some("ExitCode"))?
        .message
        .as_deref()?
        .trim()
        .parse()
        .ok()
}

/// Failure description for a non-success exec status
fn status_failure(status: &Status) -> Option<String> {
    if status.status.as_deref() != Some("Failure") {
        return None;
    }
    match exit_code(status) {
        Some(code) => Some(format!("command exited with code {}", code)),
        None => Some(
            status
                .message
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "command failed".to_string()),
        ),
    }
}

#[async_trait]
impl RemoteExec for KubeExecutor {
    async fn exec_in(&self, target: &WorkloadRef, command: &[String]) -> Result<ExecOutput> {
        let exec_err = |msg: String| Error::exec(&target.pod, &target.container, msg);

        debug!(pod = %target, container = %target.container, ?command, "Exec");

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let mut attached = pods
            .exec(&target.pod, command.to_vec(), &attach_params(&target.container))
            .await
            .map_err(|e| exec_err(format!("exec failed: {}", e)))?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let (stdout, stderr) = tokio::join!(read_stream(stdout), read_stream(stderr));
        let stdout = stdout.map_err(|e| exec_err(format!("stdout read failed: {}", e)))?;
        let stderr = stderr.map_err(|e| exec_err(format!("stderr read failed: {}", e)))?;

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };

        attached
            .join()
            .await
            .map_err(|e| exec_err(format!("exec stream error: {}", e)))?;

        if let Some(failure) = status.as_ref().and_then(status_failure) {
            debug!(pod = %target, %failure, stderr = %stderr.trim(), "Exec command failed");
            return Err(Error::exit_status(
                &target.pod,
                &target.container,
                status.as_ref().and_then(exit_code),
                with_stderr(failure, &stderr),
            ));
        }

        Ok(ExecOutput { stdout, stderr })
    }
}
