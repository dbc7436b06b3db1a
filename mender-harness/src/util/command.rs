//! Host process execution for docker, kubectl and ssh

use std::process::Stdio;
use tokio::process::Command;

use crate::error::{HarnessError, Result};

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Stdout on success, an [`HarnessError::Exec`] naming `what` otherwise
    pub fn into_stdout(self, what: &str) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(HarnessError::Exec(format!(
                "{} exited with {}: {}",
                what,
                self.status,
                self.stderr.trim()
            )))
        }
    }
}

/// Runs `program` to completion and captures its output.
///
/// A spawn failure (binary missing) is an error; a non-zero exit is not.
pub async fn run_command<I, S>(program: &str, args: I) -> Result<ExecOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    run_command_with_env(program, args, &[]).await
}

pub async fn run_command_with_env<I, S>(
    program: &str,
    args: I,
    env: &[(String, String)],
) -> Result<ExecOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|e| HarnessError::Exec(format!("failed to run {}: {}", program, e)))?;

    Ok(ExecOutput {
        // Killed by a signal: report like a shell would
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_stdout_failure_mentions_stderr() {
        let out = ExecOutput::failed(2, "no such file\n");
        let err = out.into_stdout("cat").unwrap_err();
        assert_eq!(err.to_string(), "Exec failed: cat exited with 2: no such file");
    }

    #[tokio::test]
    async fn test_run_command_missing_binary() {
        let result = run_command("definitely-not-a-real-binary-xyz", ["--help"]).await;
        assert!(matches!(result, Err(HarnessError::Exec(_))));
    }
}
