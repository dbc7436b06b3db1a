use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{HarnessError, Result};
use crate::util::polling::WaitConfig;

pub const CONFIG_PATH_ENV: &str = "MENDER_HARNESS_CONFIG";

fn default_manager() -> String {
    "docker-compose".to_string()
}

fn default_integration_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_machine_name() -> String {
    "qemux86-64".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_docker_bin() -> String {
    "docker".to_string()
}

fn default_kubectl_bin() -> String {
    "kubectl".to_string()
}

/// Attempts and interval of one bounded wait
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub attempts: u32,
    pub interval_secs: u64,
}

impl WaitSettings {
    pub const fn new(attempts: u32, interval_secs: u64) -> Self {
        Self {
            attempts,
            interval_secs,
        }
    }

    pub fn to_wait(self, description: impl Into<String>) -> WaitConfig {
        WaitConfig::with_description(description)
            .max_attempts(self.attempts)
            .interval(Duration::from_secs(self.interval_secs))
    }
}

fn default_health_wait() -> WaitSettings {
    WaitSettings::new(60, 5)
}
fn default_ssh_wait() -> WaitSettings {
    WaitSettings::new(60, 5)
}
fn default_connect_wait() -> WaitSettings {
    WaitSettings::new(30, 2)
}
fn default_device_wait() -> WaitSettings {
    WaitSettings::new(60, 2)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HarnessConfig {
    /// Container manager backend: `docker-compose` or `minikube`
    #[serde(default = "default_manager")]
    pub manager: String,
    /// Root of the compose manifests
    #[serde(default = "default_integration_dir")]
    pub integration_dir: PathBuf,
    #[serde(default = "default_machine_name")]
    pub machine_name: String,
    /// Fixed gateway host, bypassing container address lookup
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    #[serde(default = "default_kubectl_bin")]
    pub kubectl_bin: String,
    /// Services run inside a cluster and need port forwarding
    #[serde(default)]
    pub kubernetes: bool,

    #[serde(default = "default_health_wait")]
    pub health_wait: WaitSettings,
    #[serde(default = "default_ssh_wait")]
    pub ssh_wait: WaitSettings,
    #[serde(default = "default_connect_wait")]
    pub connect_wait: WaitSettings,
    #[serde(default = "default_device_wait")]
    pub device_wait: WaitSettings,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            manager: default_manager(),
            integration_dir: default_integration_dir(),
            machine_name: default_machine_name(),
            gateway: None,
            log_level: default_log_level(),
            docker_bin: default_docker_bin(),
            kubectl_bin: default_kubectl_bin(),
            kubernetes: false,
            health_wait: default_health_wait(),
            ssh_wait: default_ssh_wait(),
            connect_wait: default_connect_wait(),
            device_wait: default_device_wait(),
        }
    }
}

impl HarnessConfig {
    /// Defaults, then the JSON file named by `MENDER_HARNESS_CONFIG`, then
    /// individual environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&PathBuf::from(path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: HarnessConfig = serde_json::from_str(&contents)?;
        info!("Loaded harness config from {:?}", path);
        Ok(config)
    }

    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("MENDER_HARNESS_MANAGER") {
            self.manager = v;
        }
        if let Some(v) = get("MENDER_INTEGRATION_DIR") {
            self.integration_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MENDER_MACHINE_NAME") {
            self.machine_name = v;
        }
        if let Some(v) = get("MENDER_GATEWAY") {
            self.gateway = Some(v);
        }
        if let Some(v) = get("MENDER_HARNESS_LOG") {
            self.log_level = v;
        }
        if let Some(v) = get("K8S") {
            self.kubernetes = !v.is_empty() && v != "0";
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.integration_dir.is_dir() {
            warn!(
                "Integration directory {:?} does not exist",
                self.integration_dir
            );
            return Err(HarnessError::Provisioning(format!(
                "integration directory {:?} not found",
                self.integration_dir
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.manager, "docker-compose");
        assert_eq!(config.machine_name, "qemux86-64");
        assert_eq!(config.gateway, None);
        assert!(!config.kubernetes);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{"manager": "minikube", "ssh_wait": {"attempts": 3, "interval_secs": 1}}"#)
                .unwrap();
        assert_eq!(config.manager, "minikube");
        assert_eq!(config.ssh_wait, WaitSettings::new(3, 1));
        assert_eq!(config.health_wait, default_health_wait());
    }

    #[test]
    fn test_validate_requires_integration_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.integration_dir = dir.path().to_path_buf();
        assert!(config.validate().is_ok());

        config.integration_dir = dir.path().join("missing");
        assert!(matches!(config.validate(), Err(HarnessError::Provisioning(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MENDER_MACHINE_NAME", "raspberrypi4"),
            ("MENDER_GATEWAY", "10.0.0.1"),
            ("K8S", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.machine_name, "raspberrypi4");
        assert_eq!(config.gateway.as_deref(), Some("10.0.0.1"));
        assert!(config.kubernetes);
        assert_eq!(config.manager, "docker-compose");
    }
}
