//! Tenant provisioning: organizations, admin users and bootstrap tokens

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::api::check_status;
use crate::auth::useradm::TENANTADM_SERVICE;
use crate::environment::Environment;
use crate::error::{HarnessError, Result};

pub const TENANTADM_BIN: &str = "/usr/bin/tenantadm";
pub const TENANTADM_INTERNAL_PORT: u16 = 8080;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Addon {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Bootstrap token a device presents to join the tenant
    #[serde(default)]
    pub tenant_token: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub addons: Vec<Addon>,
    #[serde(skip)]
    pub users: Vec<TenantUser>,
}

impl Tenant {
    /// The user the organization was created with
    pub fn admin_username(&self) -> String {
        self.users
            .first()
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    /// Creates the organization with its admin user, returning the tenant id
    async fn create_org(&self, name: &str, username: &str, password: &str, plan: &str) -> Result<String>;

    async fn get_tenant(&self, id: &str) -> Result<Tenant>;

    /// Enables exactly `addons` on the tenant
    async fn update_tenant(&self, id: &str, addons: &[&str]) -> Result<()>;
}

/// Creates an organization and returns it with its admin user attached.
///
/// Any failure leaves no tenant behind in the returned state: the caller gets
/// either a complete tenant or a [`HarnessError::TenantCreation`].
pub async fn provision_tenant(
    provisioner: &dyn TenantProvisioner,
    name: &str,
    username: &str,
    password: &str,
    plan: &str,
) -> Result<Tenant> {
    info!("Creating organization {} ({})", name, plan);
    let id = provisioner
        .create_org(name, username, password, plan)
        .await
        .map_err(as_tenant_error)?;
    let mut tenant = provisioner.get_tenant(&id).await.map_err(as_tenant_error)?;
    if tenant.tenant_token.is_empty() {
        return Err(HarnessError::TenantCreation(format!(
            "tenant {} has no bootstrap token",
            id
        )));
    }
    tenant.users.push(TenantUser {
        username: username.to_string(),
        password: password.to_string(),
    });
    Ok(tenant)
}

fn as_tenant_error(e: HarnessError) -> HarnessError {
    match e {
        HarnessError::TenantCreation(_) => e,
        other => HarnessError::TenantCreation(other.to_string()),
    }
}

/// `tenantadm` CLI inside the environment's tenantadm container
pub struct CliTenantadm {
    env: Arc<Environment>,
    http: reqwest::Client,
}

impl CliTenantadm {
    pub fn new(env: Arc<Environment>) -> Self {
        Self {
            env,
            http: reqwest::Client::new(),
        }
    }

    async fn run(&self, argv: &[&str], what: &str) -> Result<String> {
        let mut full = vec![TENANTADM_BIN];
        full.extend_from_slice(argv);
        self.env
            .exec_in_service(TENANTADM_SERVICE, &full)
            .await?
            .into_stdout(what)
            .map_err(|e| HarnessError::TenantCreation(e.to_string()))
    }
}

#[async_trait]
impl TenantProvisioner for CliTenantadm {
    async fn create_org(&self, name: &str, username: &str, password: &str, plan: &str) -> Result<String> {
        let name = format!("--name={}", name);
        let username = format!("--username={}", username);
        let password = format!("--password={}", password);
        let plan = format!("--plan={}", plan);
        let out = self
            .run(&["create-org", &name, &username, &password, &plan], "tenantadm create-org")
            .await?;
        let id = out.trim();
        if id.is_empty() {
            return Err(HarnessError::TenantCreation(
                "tenantadm create-org printed no tenant id".to_string(),
            ));
        }
        Ok(id.to_string())
    }

    async fn get_tenant(&self, id: &str) -> Result<Tenant> {
        let id = format!("--id={}", id);
        let out = self.run(&["get-tenant", &id], "tenantadm get-tenant").await?;
        Ok(serde_json::from_str(out.trim())?)
    }

    async fn update_tenant(&self, id: &str, addons: &[&str]) -> Result<()> {
        let ip = self.env.service_ip(TENANTADM_SERVICE).await?;
        let url = format!(
            "http://{}:{}/api/internal/v1/tenantadm/tenants/{}",
            ip, TENANTADM_INTERNAL_PORT, id
        );
        let response = self
            .http
            .put(url)
            .json(&addons_body(addons))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

fn addons_body(addons: &[&str]) -> serde_json::Value {
    let addons: Vec<Addon> = addons
        .iter()
        .map(|name| Addon {
            name: name.to_string(),
            enabled: true,
        })
        .collect();
    serde_json::json!({ "addons": addons })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_json() {
        let tenant: Tenant = serde_json::from_str(
            r#"{"id":"5f1","name":"acme","tenant_token":"tok","plan":"os","status":"active"}"#,
        )
        .unwrap();
        assert_eq!(tenant.tenant_token, "tok");
        assert!(tenant.addons.is_empty());
        assert!(tenant.users.is_empty());
    }

    #[test]
    fn test_addons_body() {
        assert_eq!(
            addons_body(&["troubleshoot", "configure"]),
            serde_json::json!({"addons": [
                {"name": "troubleshoot", "enabled": true},
                {"name": "configure", "enabled": true},
            ]})
        );
    }

    struct Broken;

    #[async_trait]
    impl TenantProvisioner for Broken {
        async fn create_org(&self, _: &str, _: &str, _: &str, _: &str) -> Result<String> {
            Err(HarnessError::Exec("tenantadm exited with 1: duplicate org".into()))
        }
        async fn get_tenant(&self, _: &str) -> Result<Tenant> {
            unreachable!()
        }
        async fn update_tenant(&self, _: &str, _: &[&str]) -> Result<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_failed_creation_is_tenant_error() {
        let err = provision_tenant(&Broken, "acme", "u", "p", "os").await.unwrap_err();
        assert!(matches!(err, HarnessError::TenantCreation(m) if m.contains("duplicate org")));
    }
}
