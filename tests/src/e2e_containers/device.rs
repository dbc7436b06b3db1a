use async_trait::async_trait;
use mender_harness::backend::{ContainerRef, RemoteShell};
use mender_harness::config::WaitSettings;
use mender_harness::util::command::{run_command, ExecOutput};
use mender_harness::{DeviceProxy, HarnessError};
use std::path::Path;
use std::sync::Arc;
use testcontainers::{
    core::ExecCommand, runners::AsyncRunner, ContainerAsync, GenericImage, ImageExt,
};

use super::helpers::{E2EError, E2EResult};

const DEVICE_IMAGE: &str = "alpine";
const DEVICE_TAG: &str = "3.20";

/// [`RemoteShell`] over a testcontainers-managed container
pub struct TestcontainerShell {
    container: Arc<ContainerAsync<GenericImage>>,
}

#[async_trait]
impl RemoteShell for TestcontainerShell {
    async fn run(&self, command: &str) -> mender_harness::Result<ExecOutput> {
        let mut result = self
            .container
            .exec(ExecCommand::new(["sh", "-c", command]))
            .await
            .map_err(|e| HarnessError::Exec(e.to_string()))?;

        let stdout = result
            .stdout_to_vec()
            .await
            .map_err(|e| HarnessError::Exec(e.to_string()))?;
        let stderr = result
            .stderr_to_vec()
            .await
            .map_err(|e| HarnessError::Exec(e.to_string()))?;
        let status = result
            .exit_code()
            .await
            .map_err(|e| HarnessError::Exec(e.to_string()))?
            .unwrap_or(-1);

        Ok(ExecOutput {
            status: status as i32,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }

    async fn put(&self, local: &Path, remote_dir: &str) -> mender_harness::Result<()> {
        let target = format!(
            "{}:{}/",
            self.container.id(),
            remote_dir.trim_end_matches('/')
        );
        let local = local.to_string_lossy();
        run_command("docker", ["cp", local.as_ref(), target.as_str()])
            .await?
            .into_stdout("docker cp")?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.container.id().to_string()
    }
}

/// A bare container standing in for a device
pub struct DeviceContainer {
    container: Arc<ContainerAsync<GenericImage>>,
}

impl DeviceContainer {
    pub async fn start() -> E2EResult<Self> {
        let run_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let container = GenericImage::new(DEVICE_IMAGE, DEVICE_TAG)
            .with_cmd(["sleep", "infinity"])
            .with_container_name(format!("e2e-device-{}", run_id))
            .start()
            .await
            .map_err(|e| E2EError::Setup(e.to_string()))?;
        tracing::info!("Device container {} started", container.id());
        Ok(Self {
            container: Arc::new(container),
        })
    }

    pub fn proxy(&self, wait: WaitSettings) -> DeviceProxy {
        let shell = TestcontainerShell {
            container: self.container.clone(),
        };
        DeviceProxy::new(
            ContainerRef::new(self.container.id(), "device"),
            Arc::new(shell),
            wait,
        )
    }
}
