//! mender-connect file-transfer limits on a device

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::DeviceConnectClient;
use crate::device::DeviceProxy;
use crate::error::{HarnessError, Result};

pub const CONNECT_CONF: &str = "/etc/mender/mender-connect.conf";
pub const CONNECT_SERVICE: &str = "mender-connect";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Counters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes_tx_per_minute: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes_rx_per_minute: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FileTransferSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chroot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_sym_links: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_overwrite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_get: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_get: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_put: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_put: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_owner: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preserve_group: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub umask: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regular_files_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<Counters>,
}

/// The `Limits` section of mender-connect.conf
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct FileTransferLimits {
    pub enabled: bool,
    #[serde(default)]
    pub file_transfer: FileTransferSettings,
}

impl FileTransferLimits {
    pub fn max_file_size(size: u64) -> Self {
        Self {
            enabled: true,
            file_transfer: FileTransferSettings {
                max_file_size: Some(size),
                ..Default::default()
            },
        }
    }
}

/// Rewrites the device's connect configuration with `limits`, restarts the
/// daemon and waits for it to reconnect.
pub async fn set_limits(
    device: &DeviceProxy,
    limits: &FileTransferLimits,
    deviceconnect: &DeviceConnectClient,
    devid: &str,
    token: &str,
) -> Result<()> {
    let current = device.run(&format!("cat {}", CONNECT_CONF)).await?;
    let updated = with_limits(&current, limits)?;

    let dir = tempfile::tempdir()?;
    let local = dir.path().join("mender-connect.conf");
    tokio::fs::write(&local, updated).await?;

    device
        .run(&format!(
            "cp {conf} {conf}-backup-`ls {conf}* | wc -l`",
            conf = CONNECT_CONF
        ))
        .await?;
    device.put(&local, "/etc/mender").await?;
    info!("Restarting {} with new limits", CONNECT_SERVICE);
    device
        .run(&format!("systemctl restart {}", CONNECT_SERVICE))
        .await?;

    deviceconnect.wait_for_connect(devid, token).await
}

/// Replaces the `Limits` key of a mender-connect.conf document
fn with_limits(conf: &str, limits: &FileTransferLimits) -> Result<String> {
    let mut doc: serde_json::Value = serde_json::from_str(conf)?;
    let object = doc.as_object_mut().ok_or_else(|| {
        HarnessError::InvalidState(format!("{} is not a JSON object", CONNECT_CONF))
    })?;
    object.insert("Limits".to_string(), serde_json::to_value(limits)?);
    Ok(serde_json::to_string_pretty(&doc)?)
}
