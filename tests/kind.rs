//! Integration tests against real kind clusters
//!
//! These tests need the `kind` binary and a running Docker daemon. They are
//! ignored by default and can be run with:
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```
//!
//! Each test creates and deletes its own cluster.

mod kind_tests;
