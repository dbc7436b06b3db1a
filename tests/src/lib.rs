//! Container-backed end-to-end scenarios
//!
//! Needs a Docker daemon and, for the full topologies, an integration
//! checkout named by `MENDER_INTEGRATION_DIR`. Run with
//! `cargo test --features e2e`.

#[cfg(feature = "e2e")]
pub mod e2e_containers;

#[cfg(all(test, feature = "e2e"))]
mod e2e;
