//! Standalone device containers and helpers for E2E tests

mod device;
mod helpers;

pub use device::{DeviceContainer, TestcontainerShell};
pub use helpers::{copy_manifests, init_tracing, E2EError, E2EResult};
