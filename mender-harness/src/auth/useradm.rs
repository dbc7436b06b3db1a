//! User administration: gateway login and in-container account creation

use async_trait::async_trait;
use reqwest::StatusCode;

use super::IdentityApi;
use crate::api::{check_status, ApiClient, Gateway};
use crate::error::Result;

pub const LOGIN_PATH: &str = "/api/management/v1/useradm/auth/login";
pub const USERADM_SERVICE: &str = "mender-useradm";
pub const TENANTADM_SERVICE: &str = "mender-tenantadm";
/// Plan of organizations created by self-registration
pub const SELF_REGISTERED_PLAN: &str = "enterprise";

#[derive(Debug, Clone)]
pub struct UseradmClient {
    api: ApiClient,
}

impl UseradmClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Basic-auth login; the response body is the JWT.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<String>> {
        let response = self
            .api
            .post(LOGIN_PATH)
            .basic_auth(username, Some(password))
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let token = check_status(response).await?.text().await?;
        Ok(Some(token.trim().to_string()))
    }
}

/// Identity of a running environment: HTTP login, CLI registration
pub struct ServiceIdentity {
    gateway: Gateway,
}

impl ServiceIdentity {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl IdentityApi for ServiceIdentity {
    async fn login(&self, username: &str, password: &str) -> Result<Option<String>> {
        let client = UseradmClient::new(self.gateway.client().await?.clone());
        client.login(username, password).await
    }

    async fn register(&self, org: &str, username: &str, password: &str) -> Result<()> {
        let username = format!("--username={}", username);
        let password = format!("--password={}", password);
        let env = self.gateway.env();
        let output = if env.params().enterprise {
            let name = format!("--name={}", org);
            let plan = format!("--plan={}", SELF_REGISTERED_PLAN);
            let argv = ["/usr/bin/tenantadm", "create-org", &name, &username, &password, &plan];
            env.exec_in_service(TENANTADM_SERVICE, &argv).await?
        } else {
            let argv = ["/usr/bin/useradm", "create-user", &username, &password];
            env.exec_in_service(USERADM_SERVICE, &argv).await?
        };
        output.into_stdout("account creation")?;
        Ok(())
    }
}
