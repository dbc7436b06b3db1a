//! In-memory container backend and platform services for tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::devauth::{AuthSet, Device, DeviceAuthApi};
use crate::auth::IdentityApi;
use crate::backend::{ContainerBackend, ContainerRef, ContainerStatus, Project, RemoteShell};
use crate::environment::{Environment, GATEWAY_SERVICE};
use crate::error::{HarnessError, Result};
use crate::services::ServiceConnector;
use crate::tenant::{Addon, Tenant, TenantProvisioner};
use crate::topology::{DeviceAccess, CLIENT_SERVICE};
use crate::util::command::ExecOutput;

/// Services every fake project starts besides its clients
pub const CORE_SERVICES: &[&str] = &[
    GATEWAY_SERVICE,
    "mender-useradm",
    "mender-deviceauth",
    "mender-deviceconnect",
];
pub const ENTERPRISE_SERVICES: &[&str] = &["mender-tenantadm"];

type ExecResponder = Arc<dyn Fn(&str, &[&str]) -> ExecOutput + Send + Sync>;

struct FakeContainer {
    status: ContainerStatus,
    env: Vec<(String, String)>,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    projects: BTreeMap<String, Vec<FakeContainer>>,
    unhealthy: HashSet<String>,
    unreachable: HashSet<String>,
    fail_up: Option<String>,
    responder: Option<ExecResponder>,
}

impl FakeState {
    fn container(&self, name: &str) -> Option<&FakeContainer> {
        self.projects
            .values()
            .flatten()
            .find(|c| c.status.container.name == name)
    }

    fn new_container(&self, name: String, service: &str, env: Vec<(String, String)>) -> FakeContainer {
        let health = if self.unhealthy.contains(service) {
            "starting"
        } else {
            "healthy"
        };
        FakeContainer {
            status: ContainerStatus {
                container: ContainerRef::new(name, service),
                state: "running".to_string(),
                health: health.to_string(),
            },
            env,
        }
    }

    fn respond(&self, container: &str, argv: &[&str]) -> ExecOutput {
        match &self.responder {
            Some(f) => f(container, argv),
            None => ExecOutput::ok(""),
        }
    }
}

/// Records every call and keeps per-namespace container lists
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Containers of `service` never report healthy
    pub fn set_unhealthy(&self, service: &str) {
        self.state().unhealthy.insert(service.to_string());
    }

    /// Shells of containers whose name contains `pattern` refuse every command
    pub fn set_unreachable(&self, pattern: &str) {
        self.state().unreachable.insert(pattern.to_string());
    }

    pub fn fail_up(&self, message: &str) {
        self.state().fail_up = Some(message.to_string());
    }

    /// Answers `exec` and shell commands; receives the container name and argv
    pub fn on_exec(&self, f: impl Fn(&str, &[&str]) -> ExecOutput + Send + Sync + 'static) {
        self.state().responder = Some(Arc::new(f));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn containers(&self, namespace: &str) -> Vec<ContainerRef> {
        self.state()
            .projects
            .get(namespace)
            .map(|cs| cs.iter().map(|c| c.status.container.clone()).collect())
            .unwrap_or_default()
    }

    pub fn container_env(&self, name: &str) -> Vec<(String, String)> {
        self.state()
            .container(name)
            .map(|c| c.env.clone())
            .unwrap_or_default()
    }

    /// Every running client container with its environment
    pub fn running_clients(&self) -> Vec<(ContainerRef, Vec<(String, String)>)> {
        self.state()
            .projects
            .values()
            .flatten()
            .filter(|c| c.status.container.service == CLIENT_SERVICE)
            .map(|c| (c.status.container.clone(), c.env.clone()))
            .collect()
    }

    fn scale_locked(state: &mut FakeState, namespace: &str, service: &str, replicas: usize) {
        let prefix = format!("{}-{}-", namespace, service);
        let mut containers = state.projects.remove(namespace).unwrap_or_default();
        containers.retain(|c| {
            let name = &c.status.container.name;
            match name.strip_prefix(&prefix).and_then(|i| i.parse::<usize>().ok()) {
                Some(i) => i <= replicas,
                None => true,
            }
        });
        for i in 1..=replicas {
            let name = format!("{}{}", prefix, i);
            if !containers.iter().any(|c| c.status.container.name == name) {
                containers.push(state.new_container(name, service, Vec::new()));
            }
        }
        containers.sort_by(|a, b| a.status.container.name.cmp(&b.status.container.name));
        state.projects.insert(namespace.to_string(), containers);
    }
}

#[async_trait]
impl ContainerBackend for FakeBackend {
    async fn up(&self, project: &Project) -> Result<()> {
        let mut state = self.state();
        let ns = &project.namespace;
        state.calls.push(format!("up {}", ns));
        if let Some(message) = &state.fail_up {
            return Err(HarnessError::Provisioning(message.clone()));
        }

        let enterprise = project
            .files
            .iter()
            .any(|f| f.to_string_lossy().contains("enterprise"));
        let mut services: Vec<&str> = CORE_SERVICES.to_vec();
        if enterprise {
            services.extend_from_slice(ENTERPRISE_SERVICES);
        }
        let containers: Vec<FakeContainer> = services
            .iter()
            .map(|svc| state.new_container(format!("{}-{}-1", ns, svc), svc, project.env.clone()))
            .collect();
        state.projects.insert(ns.clone(), containers);
        for (service, replicas) in &project.scale {
            Self::scale_locked(&mut state, ns, service, *replicas);
        }
        Ok(())
    }

    async fn scale(&self, project: &Project, service: &str, replicas: usize) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(format!("scale {} {}={}", project.namespace, service, replicas));
        Self::scale_locked(&mut state, &project.namespace, service, replicas);
        Ok(())
    }

    async fn run_service(
        &self,
        project: &Project,
        service: &str,
        name: &str,
        env: &[(String, String)],
    ) -> Result<ContainerRef> {
        let mut state = self.state();
        state.calls.push(format!("run {} {}", project.namespace, name));
        let container = state.new_container(name.to_string(), service, env.to_vec());
        let reference = container.status.container.clone();
        state
            .projects
            .entry(project.namespace.clone())
            .or_default()
            .push(container);
        Ok(reference)
    }

    async fn ps(&self, project: &Project) -> Result<Vec<ContainerStatus>> {
        let state = self.state();
        let mut statuses: Vec<ContainerStatus> = state
            .projects
            .get(&project.namespace)
            .map(|cs| cs.iter().map(|c| c.status.clone()).collect())
            .unwrap_or_default();
        statuses.sort_by(|a, b| a.container.name.cmp(&b.container.name));
        Ok(statuses)
    }

    async fn down(&self, project: &Project) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("down {}", project.namespace));
        state.projects.remove(&project.namespace);
        Ok(())
    }

    async fn exec(&self, container: &ContainerRef, argv: &[&str]) -> Result<ExecOutput> {
        let mut state = self.state();
        state
            .calls
            .push(format!("exec {} {}", container.name, argv.join(" ")));
        if state.container(&container.name).is_none() {
            return Ok(ExecOutput::failed(1, format!("No such container: {}", container.name)));
        }
        Ok(state.respond(&container.name, argv))
    }

    async fn ip_of(&self, container: &ContainerRef) -> Result<String> {
        let state = self.state();
        let index = state
            .projects
            .values()
            .flatten()
            .position(|c| c.status.container.name == container.name)
            .ok_or_else(|| HarnessError::Exec(format!("No such container: {}", container.name)))?;
        Ok(format!("10.0.0.{}", index + 2))
    }

    async fn device_shell(
        &self,
        container: &ContainerRef,
        _access: DeviceAccess,
    ) -> Result<Arc<dyn RemoteShell>> {
        Ok(Arc::new(FakeShell {
            backend: self.clone(),
            container: container.name.clone(),
        }))
    }
}

pub struct FakeShell {
    backend: FakeBackend,
    container: String,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn run(&self, command: &str) -> Result<ExecOutput> {
        let mut state = self.backend.state();
        if state.unreachable.iter().any(|p| self.container.contains(p.as_str())) {
            return Ok(ExecOutput::failed(255, "ssh: connect to host: Connection refused"));
        }
        state
            .calls
            .push(format!("shell {} {}", self.container, command));
        Ok(state.respond(&self.container, &[command]))
    }

    async fn put(&self, local: &Path, remote_dir: &str) -> Result<()> {
        let mut state = self.backend.state();
        let file = local
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        state
            .calls
            .push(format!("put {} {} {}", self.container, file, remote_dir));
        Ok(())
    }

    fn describe(&self) -> String {
        self.container.clone()
    }
}

struct FakeUser {
    username: String,
    password: String,
    tenant: Option<String>,
}

struct FakeDevice {
    device: Device,
    tenant: Option<String>,
}

#[derive(Default)]
struct PlatformState {
    users: Vec<FakeUser>,
    tenants: Vec<Tenant>,
    devices: Vec<FakeDevice>,
    /// Clients already seen, joined or rejected
    seen: HashSet<String>,
    fail_create_org: bool,
}

/// Identity, tenant and device-auth services over one shared state. Client
/// containers of the linked backend join as pending devices, scoped by their
/// `TENANT_TOKEN`.
#[derive(Clone)]
pub struct FakePlatform {
    backend: FakeBackend,
    state: Arc<Mutex<PlatformState>>,
}

impl FakePlatform {
    pub fn new(backend: &FakeBackend) -> Self {
        Self {
            backend: backend.clone(),
            state: Arc::new(Mutex::new(PlatformState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_create_org(&self) {
        self.state().fail_create_org = true;
    }

    pub fn tenants(&self) -> Vec<Tenant> {
        self.state().tenants.clone()
    }

    pub fn user_count(&self) -> usize {
        self.state().users.len()
    }

    fn token_for(username: &str) -> String {
        format!("jwt-{}", username)
    }

    fn tenant_of_token(state: &PlatformState, token: &str) -> Result<Option<String>> {
        state
            .users
            .iter()
            .find(|u| Self::token_for(&u.username) == token)
            .map(|u| u.tenant.clone())
            .ok_or_else(|| HarnessError::HttpStatus {
                status: 401,
                body: "unauthorized".to_string(),
            })
    }

    fn sync_devices(&self) {
        let clients = self.backend.running_clients();
        let mut state = self.state();
        for (container, env) in clients {
            if !state.seen.insert(container.name.clone()) {
                continue;
            }
            let token = env
                .iter()
                .find(|(k, _)| k == "TENANT_TOKEN")
                .map(|(_, v)| v.clone());
            let tenant = match token {
                None => None,
                Some(token) => match state.tenants.iter().find(|t| t.tenant_token == token) {
                    Some(t) => Some(t.id.clone()),
                    // Unknown bootstrap token: the join is refused
                    None => continue,
                },
            };
            let n = state.devices.len() + 1;
            state.devices.push(FakeDevice {
                device: Device {
                    id: format!("device-{}", n),
                    status: "pending".to_string(),
                    identity_data: serde_json::json!({ "container": container.name }),
                    auth_sets: vec![AuthSet {
                        id: format!("auth-{}", n),
                        status: "pending".to_string(),
                        identity_data: serde_json::Value::Null,
                    }],
                },
                tenant,
            });
        }
    }
}

#[async_trait]
impl IdentityApi for FakePlatform {
    async fn login(&self, username: &str, password: &str) -> Result<Option<String>> {
        let state = self.state();
        Ok(state
            .users
            .iter()
            .any(|u| u.username == username && u.password == password)
            .then(|| Self::token_for(username)))
    }

    async fn register(&self, _org: &str, username: &str, password: &str) -> Result<()> {
        self.state().users.push(FakeUser {
            username: username.to_string(),
            password: password.to_string(),
            tenant: None,
        });
        Ok(())
    }
}

#[async_trait]
impl TenantProvisioner for FakePlatform {
    async fn create_org(&self, name: &str, username: &str, password: &str, plan: &str) -> Result<String> {
        let mut state = self.state();
        if state.fail_create_org {
            return Err(HarnessError::Exec("tenantadm create-org exited with 1".to_string()));
        }
        let n = state.tenants.len() + 1;
        let id = format!("tenant-{}", n);
        state.tenants.push(Tenant {
            id: id.clone(),
            name: name.to_string(),
            tenant_token: format!("tenant-token-{}", n),
            plan: plan.to_string(),
            addons: Vec::new(),
            users: Vec::new(),
        });
        state.users.push(FakeUser {
            username: username.to_string(),
            password: password.to_string(),
            tenant: Some(id.clone()),
        });
        Ok(id)
    }

    async fn get_tenant(&self, id: &str) -> Result<Tenant> {
        self.state()
            .tenants
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| HarnessError::TenantCreation(format!("tenant {} not found", id)))
    }

    async fn update_tenant(&self, id: &str, addons: &[&str]) -> Result<()> {
        let mut state = self.state();
        let tenant = state
            .tenants
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| HarnessError::HttpStatus {
                status: 404,
                body: format!("tenant {} not found", id),
            })?;
        tenant.addons = addons
            .iter()
            .map(|name| Addon {
                name: name.to_string(),
                enabled: true,
            })
            .collect();
        Ok(())
    }
}

#[async_trait]
impl DeviceAuthApi for FakePlatform {
    async fn list_devices(&self, token: &str, status: &str) -> Result<Vec<Device>> {
        self.sync_devices();
        let state = self.state();
        let tenant = Self::tenant_of_token(&state, token)?;
        Ok(state
            .devices
            .iter()
            .filter(|d| d.tenant == tenant && d.device.status == status)
            .map(|d| d.device.clone())
            .collect())
    }

    async fn set_auth_status(
        &self,
        token: &str,
        device_id: &str,
        auth_id: &str,
        status: &str,
    ) -> Result<()> {
        let mut state = self.state();
        let tenant = Self::tenant_of_token(&state, token)?;
        let not_found = || HarnessError::HttpStatus {
            status: 404,
            body: format!("device {} not found", device_id),
        };
        let device = state
            .devices
            .iter_mut()
            .find(|d| d.device.id == device_id && d.tenant == tenant)
            .ok_or_else(not_found)?;
        let auth_set = device
            .device
            .auth_sets
            .iter_mut()
            .find(|a| a.id == auth_id)
            .ok_or_else(not_found)?;
        auth_set.status = status.to_string();
        device.device.status = status.to_string();
        Ok(())
    }
}

#[async_trait]
impl ServiceConnector for FakePlatform {
    async fn identity(&self, _env: &Arc<Environment>) -> Result<Arc<dyn IdentityApi>> {
        Ok(Arc::new(self.clone()))
    }

    async fn device_auth(&self, _env: &Arc<Environment>) -> Result<Arc<dyn DeviceAuthApi>> {
        Ok(Arc::new(self.clone()))
    }

    async fn tenants(&self, _env: &Arc<Environment>) -> Result<Arc<dyn TenantProvisioner>> {
        Ok(Arc::new(self.clone()))
    }
}
