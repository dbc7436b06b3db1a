//! Environment handle: one namespaced set of containers and its lifecycle
//!
//! `Created -> Provisioning -> Ready -> TornDown`. Provisioning is never
//! re-entered; teardown is accepted from every state and is a no-op once
//! torn down.

use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{ContainerBackend, ContainerRef, Project};
use crate::config::HarnessConfig;
use crate::device::{DeviceGroup, DeviceProxy};
use crate::error::{HarnessError, Result};
use crate::lock::{SerializationGuard, SerializationLock};
use crate::topology::{Topology, TopologyParams};
use crate::util::command::ExecOutput;
use crate::util::polling::wait_for;

pub const GATEWAY_SERVICE: &str = "mender-api-gateway";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Created,
    Provisioning,
    Ready,
    TornDown,
}

impl Display for EnvState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnvState::Created => "created",
            EnvState::Provisioning => "provisioning",
            EnvState::Ready => "ready",
            EnvState::TornDown => "torn down",
        };
        f.write_str(s)
    }
}

struct Inner {
    state: EnvState,
    project: Project,
    clients: usize,
    devices: DeviceGroup,
    guard: Option<SerializationGuard>,
}

pub struct Environment {
    name: String,
    topology: Topology,
    params: TopologyParams,
    config: Arc<HarnessConfig>,
    backend: Arc<dyn ContainerBackend>,
    lock: SerializationLock,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("topology", &self.topology)
            .finish()
    }
}

impl Environment {
    /// Built by the factory; performs no I/O
    pub(crate) fn new(
        name: String,
        topology: Topology,
        clients: usize,
        config: Arc<HarnessConfig>,
        backend: Arc<dyn ContainerBackend>,
        lock: SerializationLock,
    ) -> Self {
        let params = topology.params();
        let project = Project::new(name.clone())
            .with_files(&config.integration_dir, &params.compose_files)
            .with_env(&params.env)
            .with_scale(&params.client_service, clients);
        Self {
            name,
            topology,
            params,
            config,
            backend,
            lock,
            inner: Mutex::new(Inner {
                state: EnvState::Created,
                project,
                clients,
                devices: DeviceGroup::default(),
                guard: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn params(&self) -> &TopologyParams {
        &self.params
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub async fn state(&self) -> EnvState {
        self.inner.lock().await.state
    }

    /// Brings the topology up and waits for every service to be healthy.
    pub async fn setup(&self) -> Result<()> {
        self.ensure_created(self.state().await)?;

        // Outside the state lock: state() must not wait on another environment
        let guard = if self.params.exclusive {
            Some(self.lock.acquire().await?)
        } else {
            None
        };

        let mut inner = self.inner.lock().await;
        self.ensure_created(inner.state)?;
        inner.guard = guard;
        inner.state = EnvState::Provisioning;
        info!("Provisioning {} ({})", self.name, self.topology);

        if self.params.provisions() {
            self.backend.up(&inner.project).await?;
            self.wait_healthy(&inner.project).await?;
        }

        inner.state = EnvState::Ready;
        info!("Environment {} is ready", self.name);
        Ok(())
    }

    async fn wait_healthy(&self, project: &Project) -> Result<()> {
        let wait = self
            .config
            .health_wait
            .to_wait(format!("services of {} to become healthy", self.name));
        let backend = self.backend.clone();
        let result = wait_for(wait, || {
            let backend = backend.clone();
            async move {
                match backend.ps(project).await {
                    Ok(statuses) => {
                        let unhealthy: Vec<&str> = statuses
                            .iter()
                            .filter(|s| !s.is_healthy())
                            .map(|s| s.container.name.as_str())
                            .collect();
                        if !unhealthy.is_empty() {
                            debug!("Not healthy yet: {}", unhealthy.join(", "));
                        }
                        !statuses.is_empty() && unhealthy.is_empty()
                    }
                    Err(e) => {
                        debug!("Health check failed: {}", e);
                        false
                    }
                }
            }
        })
        .await;

        match result {
            Err(HarnessError::Timeout(what)) => Err(HarnessError::Provisioning(format!(
                "timed out waiting for {}",
                what
            ))),
            other => other,
        }
    }

    /// Adds `n` device containers to a ready environment.
    pub async fn populate_clients(&self, n: usize) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_ready(inner.state, "populate_clients")?;
        let total = inner.clients + n;
        info!("Scaling {} to {} client(s) in {}", self.params.client_service, total, self.name);
        self.backend
            .scale(&inner.project, &self.params.client_service, total)
            .await?;
        inner.clients = total;
        inner.project = inner
            .project
            .clone()
            .with_scale(&self.params.client_service, total);
        Ok(())
    }

    fn ensure_created(&self, state: EnvState) -> Result<()> {
        if state == EnvState::Created {
            Ok(())
        } else {
            Err(HarnessError::InvalidState(format!(
                "setup of {} called while {}",
                self.name, state
            )))
        }
    }

    fn ensure_ready(&self, state: EnvState, what: &str) -> Result<()> {
        if state == EnvState::Ready {
            Ok(())
        } else {
            Err(HarnessError::InvalidState(format!(
                "{} on {} requires a ready environment, it is {}",
                what, self.name, state
            )))
        }
    }

    /// Running device containers, in name order
    pub async fn get_mender_clients(&self) -> Result<Vec<ContainerRef>> {
        let inner = self.inner.lock().await;
        let statuses = self.backend.ps(&inner.project).await?;
        Ok(statuses
            .into_iter()
            .filter(|s| s.container.service == self.params.client_service && s.state == "running")
            .map(|s| s.container)
            .collect())
    }

    pub async fn device_proxy(&self, container: &ContainerRef) -> Result<DeviceProxy> {
        let shell = self
            .backend
            .device_shell(container, self.params.access)
            .await?;
        Ok(DeviceProxy::new(container.clone(), shell, self.config.ssh_wait))
    }

    /// Wraps every running client not yet attached, appending it to the group
    pub async fn attach_clients(&self) -> Result<DeviceGroup> {
        let clients = self.get_mender_clients().await?;
        for container in clients {
            let attached = {
                let inner = self.inner.lock().await;
                inner.devices.iter().any(|d| d.container() == &container)
            };
            if !attached {
                let proxy = self.device_proxy(&container).await?;
                self.inner.lock().await.devices.push(proxy);
            }
        }
        Ok(self.device_group().await)
    }

    pub async fn device_group(&self) -> DeviceGroup {
        self.inner.lock().await.devices.clone()
    }

    /// Starts one client joined to a tenant through its bootstrap token.
    pub async fn new_tenant_client(&self, name: &str, tenant_token: &str) -> Result<DeviceProxy> {
        let project = {
            let inner = self.inner.lock().await;
            self.ensure_ready(inner.state, "new_tenant_client")?;
            inner.project.clone()
        };
        let container_name = format!("{}-{}", self.name, name);
        info!("Starting tenant client {}", container_name);
        let env = [("TENANT_TOKEN".to_string(), tenant_token.to_string())];
        let container = self
            .backend
            .run_service(&project, &self.params.client_service, &container_name, &env)
            .await?;
        let proxy = self.device_proxy(&container).await?;
        self.inner.lock().await.devices.push(proxy.clone());
        Ok(proxy)
    }

    /// Address of the API gateway, or the configured override
    pub async fn get_mender_gateway(&self) -> Result<String> {
        if let Some(gateway) = &self.config.gateway {
            return Ok(gateway.clone());
        }
        self.service_ip(GATEWAY_SERVICE).await
    }

    pub fn service_container(&self, service: &str) -> ContainerRef {
        ContainerRef::new(format!("{}-{}-1", self.name, service), service)
    }

    pub async fn service_ip(&self, service: &str) -> Result<String> {
        self.backend.ip_of(&self.service_container(service)).await
    }

    pub async fn exec_in_service(&self, service: &str, argv: &[&str]) -> Result<ExecOutput> {
        self.backend
            .exec(&self.service_container(service), argv)
            .await
    }

    /// Stops everything under the namespace and releases the lock. Safe to
    /// call any number of times.
    pub async fn teardown(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let previous = inner.state;
        if previous == EnvState::TornDown {
            debug!("{} already torn down", self.name);
            return Ok(());
        }

        // Custom setups start their containers outside the handle, so any
        // state past Created may own something under the namespace.
        let result = if previous == EnvState::Created {
            Ok(())
        } else {
            info!("Tearing down {}", self.name);
            self.backend.down(&inner.project).await
        };

        inner.state = EnvState::TornDown;
        inner.devices = DeviceGroup::default();
        if inner.guard.take().is_some() {
            info!("Released serialization lock held by {}", self.name);
        }
        if let Err(e) = &result {
            warn!("Teardown of {} failed: {}", self.name, e);
        }
        result
    }
}
