//! Deviceconnect file transfer and connection status

use reqwest::header::HeaderMap;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::ApiClient;
use crate::config::WaitSettings;
use crate::error::{HarnessError, Result};
use crate::util::polling::wait_for_result;

pub const DEVICECONNECT_PATH: &str = "/api/management/v1/deviceconnect";

/// File metadata sent with an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMeta {
    pub mode: String,
    pub uid: String,
    pub gid: String,
}

impl Default for UploadMeta {
    fn default() -> Self {
        Self {
            mode: "600".to_string(),
            uid: "0".to_string(),
            gid: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileTransferResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl FileTransferResponse {
    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await?.to_vec();
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header lookup, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The `error` field of a JSON error body
    pub fn error_message(&self) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.error)
    }

    /// Classifies protocol failures. Limit and permission refusals are
    /// reported to the caller as is; nothing is retried.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let message = self
            .error_message()
            .unwrap_or_else(|| String::from_utf8_lossy(&self.body).to_string());
        if message.starts_with("access denied:") {
            Err(HarnessError::AccessDenied(message))
        } else if message.contains("limit exhausted") {
            Err(HarnessError::LimitExceeded(message))
        } else {
            Err(HarnessError::HttpStatus {
                status: self.status,
                body: message,
            })
        }
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

#[derive(Deserialize)]
struct ConnectStatus {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone)]
pub struct DeviceConnectClient {
    api: ApiClient,
    connect_wait: WaitSettings,
}

impl DeviceConnectClient {
    pub fn new(api: ApiClient, connect_wait: WaitSettings) -> Self {
        Self { api, connect_wait }
    }

    fn device_path(devid: &str) -> String {
        format!("{}/devices/{}", DEVICECONNECT_PATH, devid)
    }

    pub async fn download_file(&self, path: &str, devid: &str, token: &str) -> Result<FileTransferResponse> {
        debug!("Downloading {} from {}", path, devid);
        let response = self
            .api
            .get(&format!("{}/download", Self::device_path(devid)))
            .query(&[("path", path)])
            .bearer_auth(token)
            .send()
            .await?;
        FileTransferResponse::read(response).await
    }

    pub async fn upload_file(
        &self,
        path: &str,
        content: Vec<u8>,
        devid: &str,
        token: &str,
        meta: &UploadMeta,
    ) -> Result<FileTransferResponse> {
        debug!("Uploading {} bytes to {}:{}", content.len(), devid, path);
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let file = Part::bytes(content)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("path", path.to_string())
            .text("mode", meta.mode.clone())
            .text("uid", meta.uid.clone())
            .text("gid", meta.gid.clone())
            .part("file", file);
        let response = self
            .api
            .put(&format!("{}/upload", Self::device_path(devid)))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        FileTransferResponse::read(response).await
    }

    /// Connection status as reported by deviceconnect, e.g. `connected`
    pub async fn device_status(&self, devid: &str, token: &str) -> Result<String> {
        let response = self
            .api
            .get(&Self::device_path(devid))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Ok(String::new());
        }
        Ok(response.json::<ConnectStatus>().await?.status)
    }

    /// Waits until the device's connect daemon is attached.
    pub async fn wait_for_connect(&self, devid: &str, token: &str) -> Result<()> {
        let wait = self
            .connect_wait
            .to_wait(format!("device {} to connect", devid));
        wait_for_result(wait, || async move {
            let status = self.device_status(devid, token).await?;
            Ok((status == "connected").then_some(()))
        })
        .await?;
        info!("Device {} connected", devid);
        Ok(())
    }
}
