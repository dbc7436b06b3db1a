//! Docker Compose backend driving the `docker` CLI

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use super::ssh::SshShell;
use super::{ContainerBackend, ContainerRef, ContainerStatus, Project, RemoteShell};
use crate::error::{HarnessError, Result};
use crate::topology::DeviceAccess;
use crate::util::command::{run_command, run_command_with_env, ExecOutput};

#[derive(Debug, Clone)]
pub struct DockerComposeBackend {
    docker: String,
}

/// One line (or array element) of `docker compose ps --format json`
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Health", default)]
    health: String,
}

impl DockerComposeBackend {
    pub fn new(docker: impl Into<String>) -> Self {
        Self {
            docker: docker.into(),
        }
    }

    fn compose_args(project: &Project) -> Vec<String> {
        let mut args = vec![
            "compose".to_string(),
            "-p".to_string(),
            project.namespace.clone(),
        ];
        for file in &project.files {
            args.push("-f".to_string());
            args.push(file.to_string_lossy().to_string());
        }
        args
    }

    fn scale_args(project: &Project) -> Vec<String> {
        project
            .scale
            .iter()
            .flat_map(|(svc, n)| ["--scale".to_string(), format!("{}={}", svc, n)])
            .collect()
    }

    async fn compose(&self, project: &Project, extra: &[String], what: &str) -> Result<String> {
        let mut args = Self::compose_args(project);
        args.extend_from_slice(extra);
        tracing::debug!("{} {}", self.docker, args.join(" "));
        run_command_with_env(&self.docker, &args, &project.env)
            .await?
            .into_stdout(what)
    }

    fn parse_ps(output: &str) -> Result<Vec<ContainerStatus>> {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        // Older compose releases print one JSON array, newer ones one object per line
        let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<std::result::Result<_, _>>()?
        };
        let mut statuses: Vec<ContainerStatus> = entries
            .into_iter()
            .map(|e| ContainerStatus {
                container: ContainerRef::new(e.name, e.service),
                state: e.state,
                health: e.health,
            })
            .collect();
        statuses.sort_by(|a, b| a.container.name.cmp(&b.container.name));
        Ok(statuses)
    }
}

#[async_trait]
impl ContainerBackend for DockerComposeBackend {
    async fn up(&self, project: &Project) -> Result<()> {
        let mut extra = vec!["up".to_string(), "-d".to_string()];
        extra.extend(Self::scale_args(project));
        self.compose(project, &extra, "docker compose up")
            .await
            .map_err(|e| HarnessError::Provisioning(e.to_string()))?;
        Ok(())
    }

    async fn scale(&self, project: &Project, service: &str, replicas: usize) -> Result<()> {
        let extra = vec![
            "up".to_string(),
            "-d".to_string(),
            "--no-recreate".to_string(),
            "--scale".to_string(),
            format!("{}={}", service, replicas),
        ];
        self.compose(project, &extra, "docker compose scale")
            .await
            .map_err(|e| HarnessError::Provisioning(e.to_string()))?;
        Ok(())
    }

    async fn run_service(
        &self,
        project: &Project,
        service: &str,
        name: &str,
        env: &[(String, String)],
    ) -> Result<ContainerRef> {
        let mut extra = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        for (k, v) in env {
            extra.push("-e".to_string());
            extra.push(format!("{}={}", k, v));
        }
        extra.push(service.to_string());
        self.compose(project, &extra, "docker compose run")
            .await
            .map_err(|e| HarnessError::Provisioning(e.to_string()))?;
        Ok(ContainerRef::new(name, service))
    }

    async fn ps(&self, project: &Project) -> Result<Vec<ContainerStatus>> {
        let extra = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        let out = self.compose(project, &extra, "docker compose ps").await?;
        Self::parse_ps(&out)
    }

    async fn down(&self, project: &Project) -> Result<()> {
        // Project name alone is enough for compose to find its containers
        let extra = vec![
            "down".to_string(),
            "-v".to_string(),
            "--remove-orphans".to_string(),
        ];
        self.compose(project, &extra, "docker compose down").await?;
        Ok(())
    }

    async fn exec(&self, container: &ContainerRef, argv: &[&str]) -> Result<ExecOutput> {
        let mut args = vec!["exec", container.name.as_str()];
        args.extend_from_slice(argv);
        run_command(&self.docker, &args).await
    }

    async fn ip_of(&self, container: &ContainerRef) -> Result<String> {
        let out = run_command(
            &self.docker,
            [
                "inspect",
                "-f",
                "{{range .NetworkSettings.Networks}}{{.IPAddress}} {{end}}",
                container.name.as_str(),
            ],
        )
        .await?
        .into_stdout("docker inspect")?;
        out.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| HarnessError::Exec(format!("{} has no IP address", container.name)))
    }

    async fn device_shell(
        &self,
        container: &ContainerRef,
        access: DeviceAccess,
    ) -> Result<Arc<dyn RemoteShell>> {
        match access {
            DeviceAccess::Exec => Ok(Arc::new(ContainerShell {
                backend: self.clone(),
                container: container.clone(),
            })),
            DeviceAccess::Ssh { port } => {
                let host = self.ip_of(container).await?;
                Ok(Arc::new(SshShell::new(host, port)))
            }
        }
    }
}

/// Shell of a container device, through `docker exec` / `docker cp`
pub struct ContainerShell {
    backend: DockerComposeBackend,
    container: ContainerRef,
}

#[async_trait]
impl RemoteShell for ContainerShell {
    async fn run(&self, command: &str) -> Result<ExecOutput> {
        self.backend
            .exec(&self.container, &["sh", "-c", command])
            .await
    }

    async fn put(&self, local: &Path, remote_dir: &str) -> Result<()> {
        let target = format!("{}:{}/", self.container.name, remote_dir.trim_end_matches('/'));
        let local = local.to_string_lossy();
        run_command(&self.backend.docker, ["cp", local.as_ref(), target.as_str()])
            .await?
            .into_stdout("docker cp")?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.container.name.clone()
    }
}
