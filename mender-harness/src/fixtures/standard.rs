//! Open-source topologies

use super::{Fixture, FixturePlan, Harness};
use crate::error::{HarnessError, Result};
use crate::topology::Topology;

/// The only machine the legacy client image is built for
pub const LEGACY_MACHINE: &str = "qemux86-64";

impl Harness {
    pub async fn standard_setup_one_client(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::Standard).clients(1)).await
    }

    pub async fn standard_setup_one_client_bootstrapped(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::Standard).clients(1).accepted())
            .await
    }

    /// One bootstrapped client, built once and shared by a group of tests
    pub async fn class_persistent_standard_setup_one_client_bootstrapped(&self) -> Result<Fixture> {
        self.standard_setup_one_client_bootstrapped().await
    }

    pub async fn standard_setup_one_rofs_client_bootstrapped(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::RofsClient).accepted()).await
    }

    pub async fn standard_setup_one_docker_client_bootstrapped(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::DockerClient).accepted()).await
    }

    pub async fn standard_setup_two_clients_bootstrapped(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::Standard).clients(2).accepted())
            .await
    }

    pub async fn standard_setup_without_client(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::Standard).clients(0)).await
    }

    pub async fn setup_with_legacy_client(&self) -> Result<Fixture> {
        if self.config.machine_name != LEGACY_MACHINE {
            return Err(HarnessError::Skipped(format!(
                "legacy client only runs on {}, not {}",
                LEGACY_MACHINE, self.config.machine_name
            )));
        }
        self.build(FixturePlan::new(Topology::Legacy).accepted()).await
    }

    pub async fn standard_setup_with_signed_artifact_client(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::SignedArtifact).accepted())
            .await
    }

    pub async fn standard_setup_with_short_lived_token(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::ShortLivedToken).accepted())
            .await
    }

    pub async fn setup_failover(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::Failover).accepted()).await
    }

    /// Holds the serialization lock until the fixture is closed
    pub async fn running_custom_production_setup(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::Custom)).await
    }

    /// mender-client 2.5 with mender-connect 1.0, client added after setup
    pub async fn setup_mender_connect_1_0(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::LegacyMenderClient).clients(0).populate(1))
            .await
    }
}
