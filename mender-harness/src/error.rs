//! Error type for the harness
//!
//! Every variant except the bounded polling timeouts is fatal to the fixture
//! that raised it. Nothing here is retried by the harness itself.

/// Error type for environment provisioning and fixtures
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Device {device} unreachable after {attempts} attempts")]
    DeviceUnreachable { device: String, attempts: u32 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Tenant creation failed: {0}")]
    TenantCreation(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Container manager '{0}' is not implemented")]
    NotImplemented(String),

    #[error("Unknown manager id {0}")]
    UnknownManager(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Exec failed: {0}")]
    Exec(String),

    #[error("Invalid environment state: {0}")]
    InvalidState(String),

    #[error("Skipped: {0}")]
    Skipped(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
