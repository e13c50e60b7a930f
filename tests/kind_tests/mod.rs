//! Integration tests for nsm-conncheck
//!
//! # Test Organization
//!
//! - `cluster_lifecycle`: recreating a cluster, fetching its credentials and
//!   connecting to it
//!
//! - `connectivity`: deploying the client set and probing it. The plain pod
//!   network stands in for the mesh (`eth0` instead of `nsm0`), so no mesh
//!   install is needed. The full scenario with install scripts runs when
//!   `NSM_NSE_DIR` points at an nsm-nse checkout.
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored --nocapture
//!
//! # Full scenario including mesh install
//! NSM_NSE_DIR=$HOME/go/src/github.com/cisco-app-networking/nsm-nse \
//!     cargo test --test kind full_scenario -- --ignored --nocapture
//! ```

mod cluster_lifecycle;
mod connectivity;
mod helpers;
