use std::path::Path;

/// Error type for E2E tests
#[derive(Debug, thiserror::Error)]
pub enum E2EError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Exec failed: {0}")]
    Exec(String),

    #[error(transparent)]
    Harness(#[from] mender_harness::HarnessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type E2EResult<T> = Result<T, E2EError>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Copies the top-level `*.yml` manifests of `from` so a test can edit them
pub fn copy_manifests(from: &Path, to: &Path) -> E2EResult<usize> {
    let mut copied = 0;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if entry.file_type()?.is_file() && name.to_string_lossy().ends_with(".yml") {
            std::fs::copy(entry.path(), to.join(&name))?;
            copied += 1;
        }
    }
    if copied == 0 {
        return Err(E2EError::Setup(format!(
            "no manifests in {}",
            from.display()
        )));
    }
    Ok(copied)
}
