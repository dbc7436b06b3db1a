//! Fixture graph
//!
//! Every builder follows the same order: create the environment, register
//! its teardown, set it up, attach and wait for devices, establish
//! authentication, accept devices, then optionally provision a tenant and
//! rebind to it. Registration of the teardown precedes every step that can
//! fail, so a failed build leaves nothing running.

mod enterprise;
mod standard;

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{DeviceAuth, DeviceConnectClient};
use crate::auth::AuthContext;
use crate::config::HarnessConfig;
use crate::device::{DeviceGroup, DeviceProxy};
use crate::environment::Environment;
use crate::error::{HarnessError, Result};
use crate::factory::{get_factory, Factory};
use crate::port_forward::PortForwards;
use crate::scope::CleanupScope;
use crate::services::{deviceconnect_client, HttpServices, ServiceConnector};
use crate::tenant::{provision_tenant, Tenant, TenantProvisioner};
use crate::topology::Topology;
use crate::util::logging::init_logging;

pub const TENANT_AUTH_NAME: &str = "os-tenant";
pub const TENANT_PASSWORD: &str = "whatsupdoc";

/// Entry point of a test binary: configuration, factory and service wiring
pub struct Harness {
    config: Arc<HarnessConfig>,
    factory: Factory,
    services: Arc<dyn ServiceConnector>,
    port_forwards: tokio::sync::Mutex<PortForwards>,
}

impl Harness {
    /// Loads the configuration from the environment and initializes logging.
    pub fn from_env() -> Result<Self> {
        let config = HarnessConfig::load()?;
        init_logging(&config.log_level);
        config.validate()?;
        let config = Arc::new(config);
        let factory = get_factory(&config.manager, config.clone())?;
        Ok(Self::new(factory, Arc::new(HttpServices)))
    }

    pub fn new(factory: Factory, services: Arc<dyn ServiceConnector>) -> Self {
        let config = factory.config().clone();
        let port_forwards = PortForwards::new(config.kubectl_bin.clone(), config.kubernetes);
        Self {
            config,
            factory,
            services,
            port_forwards: tokio::sync::Mutex::new(port_forwards),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Reachable form of an in-cluster service URL, shared by every fixture
    /// of the session
    pub async fn endpoint_url(&self, url: &str) -> Result<String> {
        self.port_forwards.lock().await.endpoint_url(url).await
    }

    /// Stops the session's port-forward processes
    pub async fn close(&self) {
        self.port_forwards.lock().await.close().await;
    }

    async fn build(&self, plan: FixturePlan) -> Result<Fixture> {
        let env = self.factory.create(plan.topology, None, plan.clients);

        let mut scope = CleanupScope::new();
        {
            let env = env.clone();
            scope.add_finalizer(format!("teardown {}", env.name()), move || async move {
                if let Err(e) = env.teardown().await {
                    warn!("Teardown of {} failed: {}", env.name(), e);
                }
            });
        }

        match self.provision(&env, &plan).await {
            Ok(parts) => {
                info!("Fixture on {} ready", env.name());
                Ok(Fixture {
                    device: parts.device_group.get(0).cloned(),
                    device_group: parts.device_group,
                    auth: parts.auth,
                    devauth: parts.devauth,
                    tenant: parts.tenant,
                    env,
                    services: self.services.clone(),
                    scope,
                })
            }
            Err(e) => {
                warn!("Fixture on {} failed: {}", env.name(), e);
                scope.close().await;
                Err(e)
            }
        }
    }

    async fn provision(&self, env: &Arc<Environment>, plan: &FixturePlan) -> Result<FixtureParts> {
        env.setup().await?;
        if plan.populate > 0 {
            env.populate_clients(plan.populate).await?;
        }

        let group = env.attach_clients().await?;
        group.ssh_is_opened().await?;

        let identity = self.services.identity(env).await?;
        let mut auth = AuthContext::demo(identity.clone());
        auth.reset_auth_token();
        let devauth = DeviceAuth::new(self.services.device_auth(env).await?, self.config.device_wait);

        if plan.accept && !group.is_empty() {
            let token = auth.get_auth_token().await?;
            devauth.accept_devices(&token, group.len()).await?;
        }

        let mut tenant = None;
        if let Some(tenant_plan) = &plan.tenant {
            let provisioner = self.services.tenants(env).await?;
            let created = new_tenant(provisioner.as_ref(), tenant_plan.plan).await?;

            auth = AuthContext::new(
                TENANT_AUTH_NAME,
                created.admin_username(),
                TENANT_PASSWORD,
                false,
                identity,
            );
            auth.reset_auth_token();

            for i in 1..=tenant_plan.clients {
                let name = if tenant_plan.clients == 1 {
                    "test-container".to_string()
                } else {
                    format!("test-container-{}", i)
                };
                env.new_tenant_client(&name, &created.tenant_token).await?;
            }
            env.device_group().await.ssh_is_opened().await?;

            if plan.accept && tenant_plan.clients > 0 {
                let token = auth.get_auth_token().await?;
                devauth.accept_devices(&token, tenant_plan.clients).await?;
            }
            tenant = Some(created);
        }

        Ok(FixtureParts {
            device_group: env.device_group().await,
            auth,
            devauth,
            tenant,
        })
    }
}

/// Organization with a fresh name and admin account
async fn new_tenant(provisioner: &dyn TenantProvisioner, plan: &str) -> Result<Tenant> {
    let id = uuid::Uuid::new_v4();
    provision_tenant(
        provisioner,
        &format!("test.mender.io-{}", id),
        &format!("some.user+{}@example.com", id),
        TENANT_PASSWORD,
        plan,
    )
    .await
}

#[derive(Debug, Clone)]
struct TenantPlan {
    plan: &'static str,
    clients: usize,
}

#[derive(Debug, Clone)]
struct FixturePlan {
    topology: Topology,
    /// Client replicas at setup; `None` uses the topology default
    clients: Option<usize>,
    /// Clients added after setup
    populate: usize,
    accept: bool,
    tenant: Option<TenantPlan>,
}

impl FixturePlan {
    fn new(topology: Topology) -> Self {
        Self {
            topology,
            clients: None,
            populate: 0,
            accept: false,
            tenant: None,
        }
    }

    fn clients(mut self, n: usize) -> Self {
        self.clients = Some(n);
        self
    }

    fn populate(mut self, n: usize) -> Self {
        self.populate = n;
        self
    }

    fn accepted(mut self) -> Self {
        self.accept = true;
        self
    }

    fn tenant(mut self, plan: &'static str, clients: usize) -> Self {
        self.tenant = Some(TenantPlan { plan, clients });
        self
    }
}

struct FixtureParts {
    device_group: DeviceGroup,
    auth: AuthContext,
    devauth: DeviceAuth,
    tenant: Option<Tenant>,
}

/// A provisioned environment plus everything a test body needs. Tear it
/// down with [`Fixture::close`]; dropping it unclosed tears down as well.
pub struct Fixture {
    pub env: Arc<Environment>,
    pub device: Option<DeviceProxy>,
    pub device_group: DeviceGroup,
    pub auth: AuthContext,
    pub devauth: DeviceAuth,
    pub tenant: Option<Tenant>,
    services: Arc<dyn ServiceConnector>,
    scope: CleanupScope,
}

impl std::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fixture")
            .field("env", &self.env)
            .field("device_group", &self.device_group)
            .field("auth", &self.auth)
            .field("tenant", &self.tenant)
            .field("pending_finalizers", &self.scope.pending())
            .finish_non_exhaustive()
    }
}

impl Fixture {
    /// The first device, for single-client fixtures
    pub fn device(&self) -> Result<&DeviceProxy> {
        self.device
            .as_ref()
            .ok_or_else(|| HarnessError::InvalidState(format!("{} has no device", self.env.name())))
    }

    pub async fn auth_token(&mut self) -> Result<String> {
        self.auth.get_auth_token().await
    }

    pub async fn tenants(&self) -> Result<Arc<dyn TenantProvisioner>> {
        self.services.tenants(&self.env).await
    }

    pub async fn deviceconnect(&self) -> Result<DeviceConnectClient> {
        deviceconnect_client(&self.env).await
    }

    /// Registers extra cleanup, run before the environment teardown
    pub fn scope_mut(&mut self) -> &mut CleanupScope {
        &mut self.scope
    }

    pub async fn close(mut self) {
        self.scope.close().await;
    }
}

#[cfg(test)]
mod tests;
