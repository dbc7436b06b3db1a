use anyhow::Context;
use clap::{ArgGroup, Parser};
use mender_shared::VersionType;
use std::io::Write;
use std::path::PathBuf;

use crate::component::{ComponentMap, ComponentType};
use crate::git::CliGit;
use crate::versions::ReleaseTool;

#[derive(Parser, Debug)]
#[command(name = "release-tool")]
#[command(about = "Query and pin component versions of the integration manifests", long_about = None)]
#[command(disable_version_flag = true)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["version_of", "set_version_of", "list", "integration_versions_including"])
))]
pub struct Cli {
    /// Print the version of a git repo, docker image or container
    #[arg(long, value_name = "NAME")]
    version_of: Option<String>,

    /// Which manifests to read the version from
    #[arg(long, value_name = "git|docker", default_value = "git")]
    version_type: VersionType,

    /// Read the manifests of an integration tag or branch instead of the working tree
    #[arg(long, value_name = "VERSION", requires = "version_of")]
    in_integration_version: Option<String>,

    /// Pin every image of a component to --version
    #[arg(long, value_name = "NAME", requires = "version")]
    set_version_of: Option<String>,

    #[arg(long, value_name = "VERSION")]
    version: Option<String>,

    /// List release components of one type
    #[arg(
        long,
        value_name = "git|docker|container",
        num_args = 0..=1,
        default_missing_value = "git"
    )]
    list: Option<ComponentType>,

    /// Only list components versioned with the backend
    #[arg(long, requires = "list")]
    only_backend: bool,

    /// Print the integration branches shipping a component at --version
    #[arg(long, value_name = "NAME", requires = "version")]
    integration_versions_including: Option<String>,

    /// Integration repository checkout (defaults to the parent of the working directory)
    #[arg(long, env = "INTEGRATION_DIR")]
    integration_dir: Option<PathBuf>,
}

impl Cli {
    fn integration_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.integration_dir {
            return Ok(dir.clone());
        }
        let cwd = std::env::current_dir().context("Failed to read working directory")?;
        Ok(cwd.parent().map(PathBuf::from).unwrap_or(cwd))
    }
}

/// Runs one parsed invocation, writing results to `out`
pub fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let dir = cli.integration_dir()?;
    tracing::debug!("integration directory {}", dir.display());
    let tool = ReleaseTool::new(&dir, ComponentMap::builtin()?, Box::new(CliGit::new(&dir)));

    let lines: Vec<String> = if let Some(name) = &cli.version_of {
        vec![tool.version_of(name, cli.version_type, cli.in_integration_version.as_deref())?]
    } else if let Some(name) = &cli.set_version_of {
        let version = required_version(&cli)?;
        let count = tool.set_version_of(name, version)?;
        tracing::info!("Set {} to {} ({} image line(s))", name, version, count);
        Vec::new()
    } else if let Some(kind) = cli.list {
        tool.list(kind, cli.only_backend)
    } else if let Some(name) = &cli.integration_versions_including {
        tool.integration_versions_including(name, required_version(&cli)?)?
    } else {
        anyhow::bail!("No action given");
    };

    if !lines.is_empty() {
        writeln!(out, "{}", lines.join("\n"))?;
    }
    Ok(())
}

fn required_version(cli: &Cli) -> anyhow::Result<&str> {
    cli.version
        .as_deref()
        .context("--version is required for this action")
}
