//! Catalogue of git repositories, the docker images they build and the
//! compose services those images run as.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::{ReleaseToolError, Result};

const COMPONENT_MAPS: &str = include_str!("component-maps.yml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentType {
    Git,
    DockerImage,
    DockerContainer,
}

impl Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentType::Git => write!(f, "git"),
            ComponentType::DockerImage => write!(f, "docker"),
            ComponentType::DockerContainer => write!(f, "container"),
        }
    }
}

impl FromStr for ComponentType {
    type Err = ReleaseToolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "git" => Ok(ComponentType::Git),
            "docker" | "docker_image" => Ok(ComponentType::DockerImage),
            "container" | "docker_container" => Ok(ComponentType::DockerContainer),
            other => Err(ReleaseToolError::Usage(format!(
                "unknown component type {} (expected git, docker or container)",
                other
            ))),
        }
    }
}

/// Which repositories take part in a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentFilter {
    #[default]
    OnlyRelease,
    All,
    OnlyNonRelease,
    /// Release components versioned on their own
    OnlyIndependent,
    /// Release components versioned with the backend
    OnlyNonIndependent,
}

#[derive(Debug, Clone, Deserialize)]
struct RepoEntry {
    #[serde(default = "default_true")]
    release_component: bool,
    #[serde(default)]
    independent_component: bool,
    /// Image name to the containers running it
    #[serde(default)]
    images: BTreeMap<String, Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl RepoEntry {
    fn matches(&self, filter: ComponentFilter) -> bool {
        match filter {
            ComponentFilter::All => true,
            ComponentFilter::OnlyRelease => self.release_component,
            ComponentFilter::OnlyNonRelease => !self.release_component,
            ComponentFilter::OnlyIndependent => {
                self.release_component && self.independent_component
            }
            ComponentFilter::OnlyNonIndependent => {
                self.release_component && !self.independent_component
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Component {
    pub name: String,
    pub kind: ComponentType,
}

impl Component {
    fn new(name: &str, kind: ComponentType) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentMap {
    repos: BTreeMap<String, RepoEntry>,
}

impl ComponentMap {
    /// The catalogue shipped with the tool
    pub fn builtin() -> Result<Self> {
        Self::parse(COMPONENT_MAPS)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self {
            repos: serde_yaml::from_str(text)?,
        })
    }

    /// Components of one type, sorted and deduplicated
    pub fn get_components_of_type(
        &self,
        kind: ComponentType,
        filter: ComponentFilter,
    ) -> Vec<Component> {
        let mut names = BTreeSet::new();
        for (repo, entry) in self.repos.iter().filter(|(_, e)| e.matches(filter)) {
            match kind {
                ComponentType::Git => {
                    names.insert(repo.as_str());
                }
                ComponentType::DockerImage => {
                    names.extend(entry.images.keys().map(String::as_str));
                }
                ComponentType::DockerContainer => {
                    names.extend(entry.images.values().flatten().map(String::as_str));
                }
            }
        }
        names.into_iter().map(|n| Component::new(n, kind)).collect()
    }

    /// Docker images a git repo, image or container name stands for.
    ///
    /// A container resolves to every image that can run as it, so both the
    /// open source and the enterprise flavour are covered.
    pub fn images_of(&self, name: &str) -> Result<Vec<String>> {
        if let Some(entry) = self.repos.get(name) {
            return Ok(entry.images.keys().cloned().collect());
        }
        if self.repos.values().any(|e| e.images.contains_key(name)) {
            return Ok(vec![name.to_string()]);
        }

        let images: BTreeSet<&str> = self
            .repos
            .values()
            .filter(|e| e.release_component)
            .flat_map(|e| e.images.iter())
            .filter(|(_, containers)| containers.iter().any(|c| c == name))
            .map(|(image, _)| image.as_str())
            .collect();
        if images.is_empty() {
            return Err(ReleaseToolError::UnknownComponent(name.to_string()));
        }
        Ok(images.into_iter().map(str::to_string).collect())
    }
}
