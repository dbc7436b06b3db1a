//! Device authentication (v2 management API)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{check_status, ApiClient};
use crate::config::WaitSettings;
use crate::error::{HarnessError, Result};
use crate::util::polling::wait_for_result;

pub const DEVICES_PATH: &str = "/api/management/v2/devauth/devices";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSet {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub identity_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub identity_data: serde_json::Value,
    #[serde(default)]
    pub auth_sets: Vec<AuthSet>,
}

impl Device {
    /// First auth set still waiting for a decision
    pub fn pending_auth_set(&self) -> Option<&AuthSet> {
        self.auth_sets.iter().find(|a| a.status == "pending")
    }
}

/// Raw calls against the device-auth service, scoped by the bearer token
#[async_trait]
pub trait DeviceAuthApi: Send + Sync {
    async fn list_devices(&self, token: &str, status: &str) -> Result<Vec<Device>>;

    async fn set_auth_status(
        &self,
        token: &str,
        device_id: &str,
        auth_id: &str,
        status: &str,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct HttpDeviceAuth {
    api: ApiClient,
}

impl HttpDeviceAuth {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl DeviceAuthApi for HttpDeviceAuth {
    async fn list_devices(&self, token: &str, status: &str) -> Result<Vec<Device>> {
        let response = self
            .api
            .get(DEVICES_PATH)
            .bearer_auth(token)
            .query(&[("status", status), ("per_page", "500")])
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn set_auth_status(
        &self,
        token: &str,
        device_id: &str,
        auth_id: &str,
        status: &str,
    ) -> Result<()> {
        let path = format!("{}/{}/auth/{}/status", DEVICES_PATH, device_id, auth_id);
        let response = self
            .api
            .put(&path)
            .bearer_auth(token)
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Acceptance handshake on top of [`DeviceAuthApi`]
#[derive(Clone)]
pub struct DeviceAuth {
    api: Arc<dyn DeviceAuthApi>,
    wait: WaitSettings,
}

impl DeviceAuth {
    pub fn new(api: Arc<dyn DeviceAuthApi>, wait: WaitSettings) -> Self {
        Self { api, wait }
    }

    /// Polls until at least `expected` devices are in `status`.
    pub async fn get_devices_status(
        &self,
        token: &str,
        status: &str,
        expected: usize,
    ) -> Result<Vec<Device>> {
        let wait = self
            .wait
            .to_wait(format!("{} {} device(s)", expected, status));
        wait_for_result(wait, || async move {
            let devices = self.api.list_devices(token, status).await?;
            Ok((devices.len() >= expected).then_some(devices))
        })
        .await
    }

    /// Accepts `n` pending devices and returns the accepted set, which must
    /// hold exactly those `n`.
    pub async fn accept_devices(&self, token: &str, n: usize) -> Result<Vec<Device>> {
        let pending = self.get_devices_status(token, "pending", n).await?;
        for device in pending.iter().take(n) {
            let auth_set = device.pending_auth_set().ok_or_else(|| {
                HarnessError::InvalidState(format!("device {} has no pending auth set", device.id))
            })?;
            info!("Accepting device {}", device.id);
            self.api
                .set_auth_status(token, &device.id, &auth_set.id, "accepted")
                .await?;
        }
        let accepted = self.get_devices_status(token, "accepted", n).await?;
        if accepted.len() != n {
            return Err(HarnessError::InvalidState(format!(
                "expected {} accepted device(s), found {}",
                n,
                accepted.len()
            )));
        }
        Ok(accepted)
    }
}
