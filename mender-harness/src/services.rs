//! Wiring from a running environment to its service clients

use async_trait::async_trait;
use std::sync::Arc;

use crate::api::{ApiClient, Device, DeviceAuthApi, DeviceConnectClient, Gateway, HttpDeviceAuth};
use crate::auth::{IdentityApi, ServiceIdentity};
use crate::environment::Environment;
use crate::error::Result;
use crate::tenant::{CliTenantadm, TenantProvisioner};

/// Builds the identity, device-auth and tenant collaborators of an environment
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    async fn identity(&self, env: &Arc<Environment>) -> Result<Arc<dyn IdentityApi>>;

    async fn device_auth(&self, env: &Arc<Environment>) -> Result<Arc<dyn DeviceAuthApi>>;

    async fn tenants(&self, env: &Arc<Environment>) -> Result<Arc<dyn TenantProvisioner>>;
}

/// The real services, reached through the environment's gateway. Nothing
/// is resolved until the first request.
#[derive(Debug, Clone, Default)]
pub struct HttpServices;

async fn gateway_client(env: &Environment) -> Result<ApiClient> {
    ApiClient::new(&env.get_mender_gateway().await?)
}

#[async_trait]
impl ServiceConnector for HttpServices {
    async fn identity(&self, env: &Arc<Environment>) -> Result<Arc<dyn IdentityApi>> {
        Ok(Arc::new(ServiceIdentity::new(Gateway::new(env.clone()))))
    }

    async fn device_auth(&self, env: &Arc<Environment>) -> Result<Arc<dyn DeviceAuthApi>> {
        Ok(Arc::new(GatewayDeviceAuth {
            gateway: Gateway::new(env.clone()),
        }))
    }

    async fn tenants(&self, env: &Arc<Environment>) -> Result<Arc<dyn TenantProvisioner>> {
        Ok(Arc::new(CliTenantadm::new(env.clone())))
    }
}

struct GatewayDeviceAuth {
    gateway: Gateway,
}

impl GatewayDeviceAuth {
    async fn api(&self) -> Result<HttpDeviceAuth> {
        Ok(HttpDeviceAuth::new(self.gateway.client().await?.clone()))
    }
}

#[async_trait]
impl DeviceAuthApi for GatewayDeviceAuth {
    async fn list_devices(&self, token: &str, status: &str) -> Result<Vec<Device>> {
        self.api().await?.list_devices(token, status).await
    }

    async fn set_auth_status(
        &self,
        token: &str,
        device_id: &str,
        auth_id: &str,
        status: &str,
    ) -> Result<()> {
        self.api()
            .await?
            .set_auth_status(token, device_id, auth_id, status)
            .await
    }
}

/// Deviceconnect client for the environment's gateway
pub async fn deviceconnect_client(env: &Environment) -> Result<DeviceConnectClient> {
    Ok(DeviceConnectClient::new(
        gateway_client(env).await?,
        env.config().connect_wait,
    ))
}
