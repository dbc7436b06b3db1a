//! Read-only access to the integration repository's history

use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{ReleaseToolError, Result};

const UPSTREAM_URL_MARKER: &str = "mendersoftware/integration";
const DEFAULT_REMOTE: &str = "origin";

pub trait GitRepo {
    /// `(name, url)` of every remote
    fn remotes(&self) -> Result<Vec<(String, String)>>;

    /// Branch names of `remote`, without the `<remote>/` prefix
    fn remote_branches(&self, remote: &str) -> Result<Vec<String>>;

    /// File names at the top of the tree of `rev`
    fn ls_tree(&self, rev: &str) -> Result<Vec<String>>;

    fn show(&self, rev: &str, path: &str) -> Result<String>;
}

/// [`GitRepo`] backed by the `git` binary
#[derive(Debug, Clone)]
pub struct CliGit {
    dir: PathBuf,
}

impl CliGit {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        tracing::debug!("git -C {} {}", self.dir.display(), args.join(" "));
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.dir)
            .args(args)
            .output()?;
        if !output.status.success() {
            return Err(ReleaseToolError::Git {
                command: args.join(" "),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl GitRepo for CliGit {
    fn remotes(&self) -> Result<Vec<(String, String)>> {
        Ok(parse_remotes(&self.git(&["remote", "-v"])?))
    }

    fn remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        let out = self.git(&["branch", "-r", "--format=%(refname:short)"])?;
        Ok(strip_remote(&out, remote))
    }

    fn ls_tree(&self, rev: &str) -> Result<Vec<String>> {
        let out = self.git(&["ls-tree", "--name-only", rev])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn show(&self, rev: &str, path: &str) -> Result<String> {
        self.git(&["show", &format!("{}:{}", rev, path)])
    }
}

fn parse_remotes(out: &str) -> Vec<(String, String)> {
    let mut remotes: Vec<(String, String)> = out
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?.to_string(), parts.next()?.to_string()))
        })
        .collect();
    // Fetch and push lines repeat every remote
    remotes.dedup();
    remotes
}

fn strip_remote(out: &str, remote: &str) -> Vec<String> {
    let prefix = format!("{}/", remote);
    out.lines()
        .filter_map(|l| l.trim().strip_prefix(&prefix))
        .filter(|b| *b != "HEAD")
        .map(str::to_string)
        .collect()
}

/// Remote pointing at the upstream integration repository, else `origin`
pub fn upstream_remote(repo: &dyn GitRepo) -> Result<String> {
    let remotes = repo.remotes()?;
    Ok(remotes
        .into_iter()
        .find(|(_, url)| url.contains(UPSTREAM_URL_MARKER))
        .map(|(name, _)| name)
        .unwrap_or_else(|| DEFAULT_REMOTE.to_string()))
}

/// Tags are used as they are, branches through the upstream remote
pub fn integration_ref(repo: &dyn GitRepo, version: &str) -> Result<String> {
    let tag = Regex::new(r"^\d+\.\d+\.\d+").map_err(|e| ReleaseToolError::Usage(e.to_string()))?;
    if tag.is_match(version) {
        Ok(version.to_string())
    } else {
        Ok(format!("{}/{}", upstream_remote(repo)?, version))
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeGit;
    use super::*;

    #[test]
    fn test_parse_remotes() {
        let out = "origin\tgit@github.com:me/integration.git (fetch)\n\
                   origin\tgit@github.com:me/integration.git (push)\n\
                   upstream\thttps://github.com/mendersoftware/integration (fetch)\n\
                   upstream\thttps://github.com/mendersoftware/integration (push)\n";
        let remotes = parse_remotes(out);
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[1].0, "upstream");
    }

    #[test]
    fn test_strip_remote_skips_head_and_other_remotes() {
        let out = "upstream/HEAD\nupstream/master\nupstream/2.6.x\norigin/feature\n";
        assert_eq!(strip_remote(out, "upstream"), vec!["master", "2.6.x"]);
    }

    #[test]
    fn test_upstream_remote_detection() {
        let mut repo = FakeGit {
            remotes: vec![
                ("origin".into(), "git@github.com:me/integration.git".into()),
                ("mender".into(), "https://github.com/mendersoftware/integration".into()),
            ],
            ..Default::default()
        };
        assert_eq!(upstream_remote(&repo).unwrap(), "mender");
        repo.remotes.pop();
        assert_eq!(upstream_remote(&repo).unwrap(), "origin");
    }

    #[test]
    fn test_integration_ref() {
        let repo = FakeGit {
            remotes: vec![("up".into(), "https://github.com/mendersoftware/integration".into())],
            ..Default::default()
        };
        assert_eq!(integration_ref(&repo, "2.4.0").unwrap(), "2.4.0");
        assert_eq!(integration_ref(&repo, "2.4.0b1").unwrap(), "2.4.0b1");
        assert_eq!(integration_ref(&repo, "2.4.x").unwrap(), "up/2.4.x");
        assert_eq!(integration_ref(&repo, "master").unwrap(), "up/master");
    }
}
