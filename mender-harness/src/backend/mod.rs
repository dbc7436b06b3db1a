//! Container runtime boundary
//!
//! The harness only needs "start these services under this namespace",
//! "report health", and a few per-container primitives. Everything behind
//! [`ContainerBackend`] is the runtime's business.

pub mod compose;
pub mod ssh;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::topology::DeviceAccess;
use crate::util::command::ExecOutput;

pub use compose::DockerComposeBackend;
pub use ssh::SshShell;

/// One namespaced set of services to bring up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub namespace: String,
    /// Absolute manifest paths
    pub files: Vec<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Replica counts for scalable services
    pub scale: Vec<(String, usize)>,
}

impl Project {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            files: Vec::new(),
            env: Vec::new(),
            scale: Vec::new(),
        }
    }

    pub fn with_files(mut self, root: &Path, files: &[String]) -> Self {
        self.files = files.iter().map(|f| root.join(f)).collect();
        self
    }

    pub fn with_env(mut self, env: &[(String, String)]) -> Self {
        self.env = env.to_vec();
        self
    }

    pub fn with_scale(mut self, service: &str, replicas: usize) -> Self {
        self.scale.retain(|(s, _)| s != service);
        self.scale.push((service.to_string(), replicas));
        self
    }
}

/// Handle on one running container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerRef {
    pub name: String,
    pub service: String,
}

impl ContainerRef {
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub container: ContainerRef,
    pub state: String,
    /// Empty when the image defines no healthcheck
    pub health: String,
}

impl ContainerStatus {
    pub fn is_healthy(&self) -> bool {
        self.state == "running" && (self.health.is_empty() || self.health == "healthy")
    }
}

/// Remote shell on a device: the command channel a device proxy drives
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run(&self, command: &str) -> Result<ExecOutput>;

    /// Copies `local` into the directory `remote_dir`, keeping its file name
    async fn put(&self, local: &Path, remote_dir: &str) -> Result<()>;

    fn describe(&self) -> String;
}

#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Starts every service of the project, detached
    async fn up(&self, project: &Project) -> Result<()>;

    /// Sets the replica count of one service
    async fn scale(&self, project: &Project, service: &str, replicas: usize) -> Result<()>;

    /// Starts a one-off container of `service` named `name` with extra environment
    async fn run_service(
        &self,
        project: &Project,
        service: &str,
        name: &str,
        env: &[(String, String)],
    ) -> Result<ContainerRef>;

    /// Containers of the project, in a stable order
    async fn ps(&self, project: &Project) -> Result<Vec<ContainerStatus>>;

    /// Stops and removes every container, network and volume of the project
    async fn down(&self, project: &Project) -> Result<()>;

    async fn exec(&self, container: &ContainerRef, argv: &[&str]) -> Result<ExecOutput>;

    async fn ip_of(&self, container: &ContainerRef) -> Result<String>;

    /// Shell channel for a device container
    async fn device_shell(
        &self,
        container: &ContainerRef,
        access: DeviceAccess,
    ) -> Result<Arc<dyn RemoteShell>>;
}
