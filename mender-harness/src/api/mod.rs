//! HTTP clients for the management APIs behind the gateway

pub mod devauth;
pub mod deviceconnect;

use reqwest::{Client, RequestBuilder, Response};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::environment::Environment;
use crate::error::{HarnessError, Result};

pub use devauth::{Device, DeviceAuth, DeviceAuthApi, HttpDeviceAuth};
pub use deviceconnect::{DeviceConnectClient, FileTransferResponse};

/// Gateway-rooted HTTP client. The test gateway serves a self-signed
/// certificate.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// `https://<gateway>`
    pub fn new(gateway: &str) -> Result<Self> {
        Self::with_base_url(format!("https://{}", gateway))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder().danger_accept_invalid_certs(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path))
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.http.put(self.url(path))
    }

    pub fn http(&self) -> &Client {
        &self.http
    }
}

/// Gateway client of an environment, looked up on first request. Setups
/// that never call a service never resolve the gateway.
pub struct Gateway {
    env: Arc<Environment>,
    client: OnceCell<ApiClient>,
}

impl Gateway {
    pub fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            client: OnceCell::new(),
        }
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub async fn client(&self) -> Result<&ApiClient> {
        self.client
            .get_or_try_init(|| async { ApiClient::new(&self.env.get_mender_gateway().await?) })
            .await
    }
}

/// Turns a non-2xx response into [`HarnessError::HttpStatus`]
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(HarnessError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }
}
