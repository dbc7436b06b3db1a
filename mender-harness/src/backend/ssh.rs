//! Host `ssh`/`scp` channel to QEMU devices

use async_trait::async_trait;
use std::path::Path;

use super::RemoteShell;
use crate::error::Result;
use crate::util::command::{run_command, ExecOutput};

const SSH_USER: &str = "root";

/// Options shared by `ssh` and `scp`. Device images regenerate host keys on
/// every boot.
const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "BatchMode=yes",
    "-o",
    "ConnectTimeout=10",
    "-o",
    "LogLevel=ERROR",
];

#[derive(Debug, Clone)]
pub struct SshShell {
    host: String,
    port: u16,
}

impl SshShell {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
        args.extend([
            "-p".to_string(),
            self.port.to_string(),
            format!("{}@{}", SSH_USER, self.host),
            command.to_string(),
        ]);
        args
    }

    fn scp_args(&self, local: &Path, remote_dir: &str) -> Vec<String> {
        let mut args: Vec<String> = SSH_OPTIONS.iter().map(|s| s.to_string()).collect();
        // scp spells the port flag in upper case
        args.extend([
            "-P".to_string(),
            self.port.to_string(),
            local.to_string_lossy().to_string(),
            format!(
                "{}@{}:{}/",
                SSH_USER,
                self.host,
                remote_dir.trim_end_matches('/')
            ),
        ]);
        args
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(&self, command: &str) -> Result<ExecOutput> {
        tracing::debug!("ssh {}: {}", self.describe(), command);
        run_command("ssh", self.ssh_args(command)).await
    }

    async fn put(&self, local: &Path, remote_dir: &str) -> Result<()> {
        tracing::debug!("scp {:?} to {}:{}", local, self.describe(), remote_dir);
        run_command("scp", self.scp_args(local, remote_dir))
            .await?
            .into_stdout("scp")?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
