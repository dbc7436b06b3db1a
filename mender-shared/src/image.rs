use std::fmt::Display;

use crate::compose::ManifestError;

/// A tagged image reference such as
/// `registry.mender.io/mendersoftware/deviceauth-enterprise:4.0.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry and organization, without trailing slash. Empty for library images.
    pub prefix: String,
    pub repo: String,
    pub tag: String,
}

impl ImageRef {
    pub fn parse(s: &str) -> Result<Self, ManifestError> {
        let s = s.trim();
        let (path, tag) = match s.rsplit_once(':') {
            // A colon inside the registry part (host:port) is not a tag separator.
            Some((path, tag)) if !tag.contains('/') && !tag.is_empty() => (path, tag),
            _ => return Err(ManifestError::InvalidImage(s.to_string())),
        };
        let (prefix, repo) = match path.rsplit_once('/') {
            Some((prefix, repo)) => (prefix, repo),
            None => ("", path),
        };
        if repo.is_empty() {
            return Err(ManifestError::InvalidImage(s.to_string()));
        }
        Ok(Self {
            prefix: prefix.to_string(),
            repo: repo.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}:{}", self.repo, self.tag)
        } else {
            write!(f, "{}/{}:{}", self.prefix, self.repo, self.tag)
        }
    }
}
