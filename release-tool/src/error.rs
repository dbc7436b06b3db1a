use mender_shared::ManifestError;

#[derive(Debug, thiserror::Error)]
pub enum ReleaseToolError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("component map is invalid: {0}")]
    ComponentMap(#[from] serde_yaml::Error),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("no version of {0} found in the manifests")]
    VersionNotFound(String),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, ReleaseToolError>;
