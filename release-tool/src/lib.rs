pub mod cli;
pub mod component;
pub mod error;
pub mod git;
pub mod versions;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use cli::Cli;
pub use component::{Component, ComponentFilter, ComponentMap, ComponentType};
pub use error::{ReleaseToolError, Result};
pub use versions::ReleaseTool;

/// Logs go to stderr so stdout only carries results
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    cli::run(cli, &mut std::io::stdout().lock())
}
