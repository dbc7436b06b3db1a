//! Version lookup and pinning over the integration manifests

use mender_shared::compose::{docker_compose_files_list, filter_manifest_names, set_image_tag};
use mender_shared::{ComposeFile, VersionType};
use regex::Regex;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::component::{ComponentFilter, ComponentMap, ComponentType};
use crate::error::{ReleaseToolError, Result};
use crate::git::{integration_ref, upstream_remote, GitRepo};

const GIT_VERSIONS_FILE: &str = "git-versions.yml";

struct Manifest {
    path: PathBuf,
    contents: String,
}

impl Manifest {
    fn is_git_versions(&self) -> bool {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("git-versions"))
            .unwrap_or(false)
    }
}

pub struct ReleaseTool {
    dir: PathBuf,
    components: ComponentMap,
    git: Box<dyn GitRepo>,
}

impl ReleaseTool {
    pub fn new(dir: &Path, components: ComponentMap, git: Box<dyn GitRepo>) -> Self {
        Self {
            dir: dir.to_path_buf(),
            components,
            git,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Version of `name` pinned by the working tree, or by integration
    /// release `in_integration_version` when given.
    pub fn version_of(
        &self,
        name: &str,
        version_type: VersionType,
        in_integration_version: Option<&str>,
    ) -> Result<String> {
        let manifests = match in_integration_version {
            Some(version) => {
                let rev = integration_ref(self.git.as_ref(), version)?;
                self.manifests_at(&rev, version_type)?
            }
            None => self.local_manifests(version_type)?,
        };
        self.find_version(name, manifests)
    }

    /// Pins every image `name` resolves to in both manifest sets.
    /// Returns the number of rewritten image lines.
    pub fn set_version_of(&self, name: &str, version: &str) -> Result<usize> {
        let images = self.components.images_of(name)?;
        let files: BTreeSet<PathBuf> = docker_compose_files_list(&self.dir, VersionType::Git)?
            .into_iter()
            .chain(docker_compose_files_list(&self.dir, VersionType::Docker)?)
            .collect();

        let mut total = 0;
        for file in files {
            let original = std::fs::read_to_string(&file)?;
            let mut text = original.clone();
            let mut changed = 0;
            for image in &images {
                let (updated, count) = set_image_tag(&text, image, version);
                text = updated;
                changed += count;
            }
            if changed > 0 {
                tracing::debug!("{}: {} image(s) set to {}", file.display(), changed, version);
                std::fs::write(&file, text)?;
                total += changed;
            }
        }
        if total == 0 {
            tracing::warn!("{} is not pinned by any manifest", name);
        }
        Ok(total)
    }

    pub fn list(&self, kind: ComponentType, only_backend: bool) -> Vec<String> {
        let filter = if only_backend {
            ComponentFilter::OnlyNonIndependent
        } else {
            ComponentFilter::OnlyRelease
        };
        self.components
            .get_components_of_type(kind, filter)
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    /// Upstream integration branches whose git version of `name` matches
    /// `version`, newest first.
    pub fn integration_versions_including(&self, name: &str, version: &str) -> Result<Vec<String>> {
        let remote = upstream_remote(self.git.as_ref())?;
        let mut found = Vec::new();
        for branch in release_branches(self.git.remote_branches(&remote)?)? {
            let rev = format!("{}/{}", remote, branch);
            let manifests = self.manifests_at(&rev, VersionType::Git)?;
            match self.find_version(name, manifests) {
                Ok(v) if version_matches(&v, version) => found.push(rev),
                Ok(_) => {}
                // Older releases may predate the component
                Err(ReleaseToolError::VersionNotFound(_)) => {
                    tracing::debug!("{} not in {}", name, rev);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    fn local_manifests(&self, version_type: VersionType) -> Result<Vec<Manifest>> {
        docker_compose_files_list(&self.dir, version_type)?
            .into_iter()
            .map(|path| {
                let contents = std::fs::read_to_string(&path)?;
                Ok(Manifest { path, contents })
            })
            .collect()
    }

    fn manifests_at(&self, rev: &str, version_type: VersionType) -> Result<Vec<Manifest>> {
        let names = self.git.ls_tree(rev)?;
        let version_type = if names.iter().any(|n| n == GIT_VERSIONS_FILE) {
            version_type
        } else {
            tracing::debug!("{} has no {}, using docker versions", rev, GIT_VERSIONS_FILE);
            VersionType::Docker
        };
        filter_manifest_names(names.iter().map(String::as_str), version_type)
            .into_iter()
            .map(|name| {
                let contents = self.git.show(rev, &name)?;
                Ok(Manifest {
                    path: PathBuf::from(name),
                    contents,
                })
            })
            .collect()
    }

    fn find_version(&self, name: &str, mut manifests: Vec<Manifest>) -> Result<String> {
        let images = self.components.images_of(name)?;
        // Stable: keeps the sorted order inside each group
        manifests.sort_by_key(|m| !m.is_git_versions());
        for manifest in &manifests {
            let compose = ComposeFile::parse(&manifest.path, &manifest.contents)?;
            if let Some((_, image)) = compose
                .images()
                .into_iter()
                .find(|(_, image)| images.contains(&image.repo))
            {
                return Ok(image.tag);
            }
        }
        Err(ReleaseToolError::VersionNotFound(name.to_string()))
    }
}

/// `master` first, then `x.y.x` branches from newest to oldest
fn release_branches(branches: Vec<String>) -> Result<Vec<String>> {
    let re = Regex::new(r"^(\d+)\.(\d+)\.x$").map_err(|e| ReleaseToolError::Usage(e.to_string()))?;
    let mut numbered: Vec<((u64, u64), String)> = branches
        .iter()
        .filter_map(|b| {
            let caps = re.captures(b)?;
            let major = caps[1].parse().ok()?;
            let minor = caps[2].parse().ok()?;
            Some(((major, minor), b.clone()))
        })
        .collect();
    numbered.sort_by_key(|(v, _)| Reverse(*v));

    let master = branches.iter().any(|b| b == "master").then(|| "master".to_string());
    Ok(master
        .into_iter()
        .chain(numbered.into_iter().map(|(_, b)| b))
        .collect())
}

/// `1.2.x` matches any `1.2.` release, anything else must be exact
fn version_matches(found: &str, wanted: &str) -> bool {
    match wanted.strip_suffix('x') {
        Some(prefix) if prefix.ends_with('.') => found.starts_with(prefix),
        _ => found == wanted,
    }
}
