//! Device proxies: command and file channel to one device under test

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::backend::{ContainerRef, RemoteShell};
use crate::config::WaitSettings;
use crate::error::{HarnessError, Result};
use crate::util::command::ExecOutput;
use crate::util::polling::wait_for;

#[derive(Clone)]
pub struct DeviceProxy {
    container: ContainerRef,
    shell: Arc<dyn RemoteShell>,
    ssh_wait: WaitSettings,
    ssh_ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for DeviceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProxy")
            .field("container", &self.container.name)
            .field("shell", &self.shell.describe())
            .field("ssh_ready", &self.ssh_ready.load(Ordering::SeqCst))
            .finish()
    }
}

impl DeviceProxy {
    pub fn new(container: ContainerRef, shell: Arc<dyn RemoteShell>, ssh_wait: WaitSettings) -> Self {
        Self {
            container,
            shell,
            ssh_wait,
            ssh_ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn container(&self) -> &ContainerRef {
        &self.container
    }

    pub fn is_ssh_ready(&self) -> bool {
        self.ssh_ready.load(Ordering::SeqCst)
    }

    /// Waits until the device answers on its shell channel.
    pub async fn ssh_is_opened(&self) -> Result<()> {
        if self.is_ssh_ready() {
            return Ok(());
        }
        info!("Waiting for device {} to open ssh", self.container.name);
        let wait = self
            .ssh_wait
            .to_wait(format!("ssh on {}", self.shell.describe()));
        let shell = self.shell.clone();
        let result = wait_for(wait, || {
            let shell = shell.clone();
            async move {
                matches!(shell.run("true").await, Ok(out) if out.success())
            }
        })
        .await;

        match result {
            Ok(()) => {
                self.ssh_ready.store(true, Ordering::SeqCst);
                info!("Device {} is reachable", self.container.name);
                Ok(())
            }
            Err(HarnessError::Timeout(_)) => Err(HarnessError::DeviceUnreachable {
                device: self.container.name.clone(),
                attempts: self.ssh_wait.attempts.max(1),
            }),
            Err(e) => Err(e),
        }
    }

    /// Runs `command` and returns its stdout; a non-zero exit is an error.
    pub async fn run(&self, command: &str) -> Result<String> {
        self.shell
            .run(command)
            .await?
            .into_stdout(&format!("`{}` on {}", command, self.container.name))
    }

    /// Runs `command` and returns the raw result whatever the exit code
    pub async fn run_unchecked(&self, command: &str) -> Result<ExecOutput> {
        self.shell.run(command).await
    }

    pub async fn put(&self, local: &Path, remote_dir: &str) -> Result<()> {
        self.shell.put(local, remote_dir).await
    }
}

/// Ordered set of devices sharing one environment
#[derive(Debug, Clone, Default)]
pub struct DeviceGroup {
    devices: Vec<DeviceProxy>,
}

impl DeviceGroup {
    pub fn new(devices: Vec<DeviceProxy>) -> Self {
        Self { devices }
    }

    pub fn push(&mut self, device: DeviceProxy) {
        self.devices.push(device);
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceProxy> {
        self.devices.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceProxy> {
        self.devices.iter()
    }

    pub async fn ssh_is_opened(&self) -> Result<()> {
        for device in &self.devices {
            device.ssh_is_opened().await?;
        }
        Ok(())
    }

    /// Runs `command` on every device in order, returning each stdout
    pub async fn run(&self, command: &str) -> Result<Vec<String>> {
        let mut outputs = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            outputs.push(device.run(command).await?);
        }
        Ok(outputs)
    }
}
