//! Authentication context: cached bearer token for one principal

pub mod useradm;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{HarnessError, Result};

pub use useradm::{ServiceIdentity, UseradmClient};

pub const DEFAULT_NAME: &str = "mender-demo";
pub const DEFAULT_USERNAME: &str = "mender-demo@example.com";
pub const DEFAULT_PASSWORD: &str = "mysecretpassword!123";

/// Identity service as seen by an authentication context
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// The JWT, or `None` when the credentials are rejected
    async fn login(&self, username: &str, password: &str) -> Result<Option<String>>;

    /// Creates the account (and for enterprise setups, its organization)
    async fn register(&self, org: &str, username: &str, password: &str) -> Result<()>;
}

/// Not safe for concurrent refresh: callers hold it by `&mut`.
pub struct AuthContext {
    pub name: String,
    pub username: String,
    pub password: String,
    /// Self-register on first rejected login
    pub create_org: bool,
    token: Option<String>,
    identity: Arc<dyn IdentityApi>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("create_org", &self.create_org)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl AuthContext {
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        create_org: bool,
        identity: Arc<dyn IdentityApi>,
    ) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            password: password.into(),
            create_org,
            token: None,
            identity,
        }
    }

    /// The default demo account, registered on demand
    pub fn demo(identity: Arc<dyn IdentityApi>) -> Self {
        Self::new(DEFAULT_NAME, DEFAULT_USERNAME, DEFAULT_PASSWORD, true, identity)
    }

    /// Cached token, logging in (and self-registering once) if needed.
    pub async fn get_auth_token(&mut self) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }

        let token = match self.login().await? {
            Some(token) => token,
            None if self.create_org => {
                info!("Registering {} for {}", self.username, self.name);
                self.identity
                    .register(&self.name, &self.username, &self.password)
                    .await
                    .map_err(|e| HarnessError::Auth(format!("registering {}: {}", self.username, e)))?;
                self.login()
                    .await?
                    .ok_or_else(|| {
                        HarnessError::Auth(format!("login of {} rejected after registration", self.username))
                    })?
            }
            None => {
                return Err(HarnessError::Auth(format!(
                    "login of {} rejected",
                    self.username
                )));
            }
        };

        debug!("Obtained token for {}", self.username);
        self.token = Some(token.clone());
        Ok(token)
    }

    pub fn reset_auth_token(&mut self) {
        debug!("Resetting token of {}", self.username);
        self.token = None;
    }

    /// Login with every failure reported as `HarnessError::Auth`
    async fn login(&self) -> Result<Option<String>> {
        self.identity
            .login(&self.username, &self.password)
            .await
            .map_err(|e| HarnessError::Auth(format!("login of {}: {}", self.username, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Accounts {
        users: Mutex<Vec<(String, String)>>,
        logins: Mutex<u32>,
    }

    #[async_trait]
    impl IdentityApi for Accounts {
        async fn login(&self, username: &str, password: &str) -> Result<Option<String>> {
            let mut logins = self.logins.lock().unwrap();
            *logins += 1;
            let known = self
                .users
                .lock()
                .unwrap()
                .iter()
                .any(|(u, p)| u == username && p == password);
            Ok(known.then(|| format!("jwt-{}-{}", username, logins)))
        }

        async fn register(&self, _org: &str, username: &str, password: &str) -> Result<()> {
            self.users
                .lock()
                .unwrap()
                .push((username.to_string(), password.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_token_is_cached_until_reset() {
        let identity = Arc::new(Accounts::default());
        let mut auth = AuthContext::demo(identity.clone());

        let first = auth.get_auth_token().await.unwrap();
        assert_eq!(first, auth.get_auth_token().await.unwrap());
        // Rejected, registered, accepted
        assert_eq!(*identity.logins.lock().unwrap(), 2);

        auth.reset_auth_token();
        let second = auth.get_auth_token().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(identity.users.lock().unwrap().len(), 1);
    }

    struct Unavailable;

    #[async_trait]
    impl IdentityApi for Unavailable {
        async fn login(&self, _username: &str, _password: &str) -> Result<Option<String>> {
            Err(HarnessError::HttpStatus {
                status: 502,
                body: "bad gateway".into(),
            })
        }

        async fn register(&self, _org: &str, _username: &str, _password: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_login_is_auth_error() {
        let mut auth = AuthContext::demo(Arc::new(Unavailable));
        match auth.get_auth_token().await {
            Err(HarnessError::Auth(msg)) => assert!(msg.contains("502"), "{}", msg),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tenant_context_never_registers() {
        let identity = Arc::new(Accounts::default());
        let mut auth = AuthContext::new("os-tenant", "u@example.com", "pw", false, identity.clone());
        assert!(matches!(auth.get_auth_token().await, Err(HarnessError::Auth(_))));
        assert!(identity.users.lock().unwrap().is_empty());
    }
}
