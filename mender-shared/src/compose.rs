use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::image::ImageRef;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid image reference: {0}")]
    InvalidImage(String),

    #[error("unknown version type: {0} (expected git or docker)")]
    UnknownVersionType(String),
}

/// Which set of manifests a version is read from.
///
/// `Docker` covers the files pinning the published image tags, `Git` the ones
/// pinning the source revisions. Most client-side files belong to both sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VersionType {
    #[default]
    Git,
    Docker,
}

impl Display for VersionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionType::Git => write!(f, "git"),
            VersionType::Docker => write!(f, "docker"),
        }
    }
}

impl FromStr for VersionType {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(VersionType::Git),
            "docker" => Ok(VersionType::Docker),
            other => Err(ManifestError::UnknownVersionType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ComposeFile {
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ManifestError> {
        // An empty manifest is valid and simply pins nothing.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }

    /// Images pinned by this file, keyed by the service running them.
    /// Services without an image (build-only) and unparsable references are skipped.
    pub fn images(&self) -> Vec<(String, ImageRef)> {
        self.services
            .iter()
            .filter_map(|(name, svc)| {
                let image = svc.image.as_deref()?;
                match ImageRef::parse(image) {
                    Ok(r) => Some((name.clone(), r)),
                    Err(_) => {
                        tracing::debug!("skipping untagged image {} of {}", image, name);
                        None
                    }
                }
            })
            .collect()
    }
}

fn is_git_versions_file(name: &str) -> bool {
    name.starts_with("git-versions") && name.ends_with(".yml")
}

fn is_manifest_file(name: &str) -> bool {
    name.ends_with(".yml")
        && (name.starts_with("docker-compose")
            || name == "other-components.yml"
            || is_git_versions_file(name))
}

/// Lists the manifests carrying versions of the given type, sorted by path.
///
/// The git set swaps `docker-compose.yml` and `docker-compose.enterprise.yml`
/// for their `git-versions*.yml` counterparts; the docker set never contains
/// `git-versions*.yml`.
pub fn docker_compose_files_list(
    dir: &Path,
    version: VersionType,
) -> Result<Vec<PathBuf>, ManifestError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ManifestError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(true) = filter_manifest_name(&name, version) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Same selection as [`docker_compose_files_list`] over bare file names,
/// for trees that are not on disk (e.g. listed from a git ref).
pub fn filter_manifest_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    version: VersionType,
) -> Vec<String> {
    let mut out: Vec<String> = names
        .into_iter()
        .filter(|n| filter_manifest_name(n, version) == Some(true))
        .map(str::to_string)
        .collect();
    out.sort();
    out
}

fn filter_manifest_name(name: &str, version: VersionType) -> Option<bool> {
    if !is_manifest_file(name) {
        return None;
    }
    let keep = match version {
        VersionType::Git => {
            name != "docker-compose.yml" && name != "docker-compose.enterprise.yml"
        }
        VersionType::Docker => !is_git_versions_file(name),
    };
    Some(keep)
}

/// Rewrites the tag of every `image: <prefix>/<repo>:<tag>` line for `repo`.
///
/// Everything else in `text` is kept byte for byte. Returns the new text and
/// the number of lines changed.
pub fn set_image_tag(text: &str, repo: &str, tag: &str) -> (String, usize) {
    let pattern = format!(
        r"(?m)^(?P<lead>[ \t]*image:[ \t]+)(?P<prefix>(?:[^\s/]+/)*){}:(?P<tag>\S+)[ \t]*$",
        regex::escape(repo)
    );
    // The pattern is built from an escaped literal and cannot fail to compile.
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return (text.to_string(), 0),
    };

    let mut count = 0;
    let out = re.replace_all(text, |caps: &regex::Captures<'_>| {
        count += 1;
        format!("{}{}{}:{}", &caps["lead"], &caps["prefix"], repo, tag)
    });
    (out.into_owned(), count)
}
