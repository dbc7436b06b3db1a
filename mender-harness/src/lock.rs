//! Global serialization lock for exclusive topologies
//!
//! One in-process async mutex plus an advisory `flock` so that parallel test
//! processes on the same host serialize as well.

use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::{HarnessError, Result};

pub const LOCK_FILE_NAME: &str = ".mender-harness-exclusive.lock";

static GLOBAL: OnceLock<SerializationLock> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct SerializationLock {
    mutex: Arc<Mutex<()>>,
    /// Cross-process lock file; `None` keeps the lock process-local
    path: Option<PathBuf>,
}

/// Holds the lock until dropped
#[derive(Debug)]
pub struct SerializationGuard {
    // Field order matters: the file lock is released before the mutex
    _file: Option<Flock<File>>,
    _mutex: OwnedMutexGuard<()>,
}

impl SerializationLock {
    /// The session-wide lock shared by every factory in this process
    pub fn global() -> SerializationLock {
        GLOBAL
            .get_or_init(|| SerializationLock::new(Some(std::env::temp_dir().join(LOCK_FILE_NAME))))
            .clone()
    }

    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            mutex: Arc::new(Mutex::new(())),
            path,
        }
    }

    pub async fn acquire(&self) -> Result<SerializationGuard> {
        debug!("Waiting for serialization lock");
        let mutex = self.mutex.clone().lock_owned().await;

        let file = match &self.path {
            Some(path) => {
                let path = path.clone();
                // flock blocks the calling thread
                let locked = tokio::task::spawn_blocking(move || -> Result<Flock<File>> {
                    let file = OpenOptions::new()
                        .create(true)
                        .truncate(false)
                        .read(true)
                        .write(true)
                        .open(&path)?;
                    Flock::lock(file, FlockArg::LockExclusive)
                        .map_err(|(_, errno)| HarnessError::Io(std::io::Error::from(errno)))
                })
                .await
                .map_err(|e| HarnessError::InvalidState(format!("lock task failed: {}", e)))??;
                Some(locked)
            }
            None => None,
        };

        info!("Acquired serialization lock");
        Ok(SerializationGuard {
            _file: file,
            _mutex: mutex,
        })
    }

    /// Non-blocking check whether someone holds the lock
    pub fn is_locked(&self) -> bool {
        self.mutex.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_acquire_waits_for_release() {
        let lock = SerializationLock::new(None);
        let guard = lock.acquire().await.unwrap();
        assert!(lock.is_locked());

        let other = lock.clone();
        let waiter = tokio::spawn(async move { other.acquire().await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap().unwrap();
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_file_lock_is_reacquirable_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock = SerializationLock::new(Some(dir.path().join(LOCK_FILE_NAME)));
        drop(lock.acquire().await.unwrap());
        let _again = lock.acquire().await.unwrap();
        assert!(dir.path().join(LOCK_FILE_NAME).exists());
    }
}
