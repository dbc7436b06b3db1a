//! Enterprise (multi-tenant) topologies

use super::{Fixture, FixturePlan, Harness};
use crate::error::Result;
use crate::topology::Topology;

const TENANT_PLAN: &str = "os";

impl Harness {
    pub async fn monitor_commercial_setup_no_client(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::MonitorCommercial).clients(0))
            .await
    }

    pub async fn enterprise_no_client(&self) -> Result<Fixture> {
        self.build(FixturePlan::new(Topology::Enterprise).clients(0)).await
    }

    /// Enterprise backend without clients, shared by a group of tests
    pub async fn enterprise_no_client_class(&self) -> Result<Fixture> {
        self.enterprise_no_client().await
    }

    /// Tenant with one client joined but not yet accepted
    pub async fn enterprise_one_client(&self) -> Result<Fixture> {
        self.build(
            FixturePlan::new(Topology::Enterprise)
                .clients(0)
                .tenant(TENANT_PLAN, 1),
        )
        .await
    }

    pub async fn enterprise_one_client_bootstrapped(&self) -> Result<Fixture> {
        self.build(
            FixturePlan::new(Topology::Enterprise)
                .clients(0)
                .tenant(TENANT_PLAN, 1)
                .accepted(),
        )
        .await
    }

    pub async fn enterprise_two_clients_bootstrapped(&self) -> Result<Fixture> {
        self.build(
            FixturePlan::new(Topology::Enterprise)
                .clients(0)
                .tenant(TENANT_PLAN, 2)
                .accepted(),
        )
        .await
    }
}
