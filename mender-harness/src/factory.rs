//! Container manager factory: topology selection, no I/O

use std::sync::Arc;
use tracing::debug;

use crate::backend::{ContainerBackend, DockerComposeBackend};
use crate::config::HarnessConfig;
use crate::environment::Environment;
use crate::error::{HarnessError, Result};
use crate::lock::SerializationLock;
use crate::topology::Topology;

pub const DOCKER_COMPOSE_MANAGER: &str = "docker-compose";
pub const MINIKUBE_MANAGER: &str = "minikube";

#[derive(Clone)]
pub struct Factory {
    config: Arc<HarnessConfig>,
    backend: Arc<dyn ContainerBackend>,
    lock: SerializationLock,
}

/// Factory for the configured manager. Managers without a backend fail here
/// rather than at the first setup.
pub fn get_factory(manager: &str, config: Arc<HarnessConfig>) -> Result<Factory> {
    match manager {
        DOCKER_COMPOSE_MANAGER => {
            let backend = Arc::new(DockerComposeBackend::new(config.docker_bin.clone()));
            Ok(Factory::new(config, backend, SerializationLock::global()))
        }
        MINIKUBE_MANAGER => Err(HarnessError::NotImplemented(manager.to_string())),
        other => Err(HarnessError::UnknownManager(other.to_string())),
    }
}

/// Fresh namespace, `mender` plus 8 hex chars
pub fn new_namespace() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("mender{}", &id[..8])
}

impl Factory {
    pub fn new(config: Arc<HarnessConfig>, backend: Arc<dyn ContainerBackend>, lock: SerializationLock) -> Self {
        Self {
            config,
            backend,
            lock,
        }
    }

    pub fn config(&self) -> &Arc<HarnessConfig> {
        &self.config
    }

    /// A not-yet-provisioned environment for `topology`
    pub fn create(&self, topology: Topology, name: Option<&str>, num_clients: Option<usize>) -> Arc<Environment> {
        let name = name.map(str::to_string).unwrap_or_else(new_namespace);
        let clients = num_clients.unwrap_or_else(|| topology.params().default_clients);
        debug!("Creating {} environment {} with {} client(s)", topology, name, clients);
        Arc::new(Environment::new(
            name,
            topology,
            clients,
            self.config.clone(),
            self.backend.clone(),
            self.lock.clone(),
        ))
    }

    pub fn get_standard_setup(&self, name: Option<&str>, num_clients: Option<usize>) -> Arc<Environment> {
        self.create(Topology::Standard, name, num_clients)
    }

    pub fn get_monitor_commercial_setup(&self, name: Option<&str>, num_clients: Option<usize>) -> Arc<Environment> {
        self.create(Topology::MonitorCommercial, name, num_clients)
    }

    pub fn get_docker_client_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::DockerClient, name, None)
    }

    pub fn get_rofs_client_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::RofsClient, name, None)
    }

    pub fn get_legacy_client_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::Legacy, name, None)
    }

    pub fn get_signed_artifact_client_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::SignedArtifact, name, None)
    }

    pub fn get_short_lived_token_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::ShortLivedToken, name, None)
    }

    pub fn get_failover_server_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::Failover, name, None)
    }

    pub fn get_enterprise_setup(&self, name: Option<&str>, num_clients: Option<usize>) -> Arc<Environment> {
        self.create(Topology::Enterprise, name, num_clients)
    }

    pub fn get_enterprise_smtp_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::EnterpriseSMTP, name, None)
    }

    pub fn get_custom_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::Custom, name, None)
    }

    pub fn get_compatibility_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::Compatibility, name, None)
    }

    pub fn get_mtls_setup(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::MTLS, name, None)
    }

    pub fn get_mender_client_2_5(&self, name: Option<&str>) -> Arc<Environment> {
        self.create(Topology::LegacyMenderClient, name, None)
    }
}
