//! Container environment provisioning and fixture lifecycle for Mender
//! integration tests.
//!
//! A [`Harness`] hands out [`Fixture`]s: provisioned [`Environment`]s with
//! their devices attached, authentication established and, for enterprise
//! topologies, a tenant created. Teardown is registered before anything can
//! fail and runs exactly once.

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod device;
pub mod environment;
pub mod error;
pub mod factory;
pub mod filetransfer;
pub mod fixtures;
pub mod lock;
pub mod port_forward;
pub mod scope;
pub mod services;
pub mod tenant;
pub mod topology;
pub mod util;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use auth::AuthContext;
pub use config::HarnessConfig;
pub use device::{DeviceGroup, DeviceProxy};
pub use environment::{EnvState, Environment};
pub use error::{HarnessError, Result};
pub use factory::{get_factory, Factory};
pub use fixtures::{Fixture, Harness};
pub use lock::SerializationLock;
pub use scope::CleanupScope;
pub use tenant::Tenant;
pub use topology::Topology;
