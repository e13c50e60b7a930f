//! Mesh address discovery
//!
//! Queries each client workload's mesh interface from inside its container
//! and pulls the first dotted-quad out of the output.
//!
//! The match is not checked against the interface it came from. Any
//! IPv4-looking text earlier in the output wins, so the query is scoped to
//! the single mesh interface.

use std::net::Ipv4Addr;

use regex::Regex;
use tracing::{info, warn};

use crate::exec::{RemoteExec, WorkloadRef};
use crate::probe::ProbeTarget;
use crate::{Error, Result};

const IPV4_PATTERN: &str = concat!(
    r"\b(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.",
    r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.",
    r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.",
    r"(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\b"
);

/// Extracts IPv4 addresses from free-form command output
#[derive(Clone, Debug)]
pub struct AddressExtractor {
    pattern: Regex,
}

impl AddressExtractor {
    /// Compile the dotted-quad pattern
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(IPV4_PATTERN)
            .map_err(|e| Error::config(format!("invalid IPv4 pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// First dotted-quad in document order, if any
    pub fn extract(&self, text: &str) -> Option<Ipv4Addr> {
        self.pattern
            .find(text)
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// `ip a show dev <interface>`
pub fn interface_query(interface: &str) -> Vec<String> {
    ["ip", "a", "show", "dev", interface]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Discover the mesh address of every workload.
///
/// A workload whose query exits non-zero or prints no address is kept with
/// `address: None` and is never probed. Exec transport failures abort
/// discovery.
pub async fn discover_targets<E: RemoteExec + ?Sized>(
    exec: &E,
    extractor: &AddressExtractor,
    workloads: &[WorkloadRef],
    interface: &str,
) -> Result<Vec<ProbeTarget>> {
    let query = interface_query(interface);
    let mut targets = Vec::with_capacity(workloads.len());

    for workload in workloads {
        let address = match exec.exec_in(workload, &query).await {
            Ok(output) => {
                let address = extractor.extract(&output.stdout);
                if address.is_none() {
                    warn!(
                        pod = %workload,
                        interface,
                        stderr = %output.stderr.trim(),
                        "No mesh address found"
                    );
                }
                address
            }
            Err(Error::ExitStatus { message, .. }) => {
                warn!(pod = %workload, interface, %message, "Interface query failed");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(ip) = address {
            info!(pod = %workload, %ip, interface, "Discovered mesh address");
        }
        targets.push(ProbeTarget {
            workload: workload.clone(),
            address,
        });
    }

    Ok(targets)
}

/// Fail unless at least `required` targets have an address.
pub fn ensure_addressed(targets: &[ProbeTarget], interface: &str, required: usize) -> Result<()> {
    let addressed = targets.iter().filter(|t| t.address.is_some()).count();
    if addressed < required {
        return Err(Error::MissingAddresses {
            interface: interface.to_string(),
            addressed,
            total: targets.len(),
        });
    }
    Ok(())
}
