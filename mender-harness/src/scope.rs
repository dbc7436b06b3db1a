//! Cleanup scope: finalizers registered at acquisition, run LIFO exactly once

use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, warn};

type Finalizer = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
pub struct CleanupScope {
    finalizers: Vec<(String, Finalizer)>,
}

impl CleanupScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a finalizer. Register before the step that can fail.
    pub fn add_finalizer<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        debug!("Registered finalizer {}", name);
        self.finalizers
            .push((name, Box::new(move || Box::pin(f()) as BoxFuture<'static, ()>)));
    }

    pub fn pending(&self) -> usize {
        self.finalizers.len()
    }

    /// Runs every finalizer, newest first. A second call is a no-op.
    pub async fn close(&mut self) {
        while let Some((name, finalizer)) = self.finalizers.pop() {
            debug!("Running finalizer {}", name);
            finalizer().await;
        }
    }
}

impl Drop for CleanupScope {
    fn drop(&mut self) {
        if self.finalizers.is_empty() {
            return;
        }
        warn!(
            "Cleanup scope dropped with {} pending finalizer(s), running them now",
            self.finalizers.len()
        );
        let mut finalizers = std::mem::take(&mut self.finalizers);

        // Drop may run inside a runtime (or during a panic), so the async
        // finalizers get their own thread and runtime.
        let handle = std::thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Cannot build cleanup runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                while let Some((name, finalizer)) = finalizers.pop() {
                    debug!("Running finalizer {}", name);
                    finalizer().await;
                }
            });
        });
        if handle.join().is_err() {
            warn!("Cleanup thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn push(log: &Log, tag: &'static str) -> impl FnOnce() -> BoxFuture<'static, ()> + Send + 'static {
        let log = log.clone();
        move || Box::pin(async move { log.lock().unwrap().push(tag) })
    }

    #[tokio::test]
    async fn test_close_runs_lifo_once() {
        let log = Log::default();
        let mut scope = CleanupScope::new();
        scope.add_finalizer("first", push(&log, "first"));
        scope.add_finalizer("second", push(&log, "second"));
        scope.close().await;
        scope.close().await;
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
        assert_eq!(scope.pending(), 0);
    }

    #[tokio::test]
    async fn test_drop_runs_pending_finalizers() {
        let log = Log::default();
        {
            let mut scope = CleanupScope::new();
            scope.add_finalizer("a", push(&log, "a"));
            scope.add_finalizer("b", push(&log, "b"));
        }
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_drop_outside_runtime() {
        let log = Log::default();
        drop({
            let mut scope = CleanupScope::new();
            scope.add_finalizer("only", push(&log, "only"));
            scope
        });
        assert_eq!(*log.lock().unwrap(), vec!["only"]);
    }
}
