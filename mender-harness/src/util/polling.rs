//! Bounded polling
//!
//! The only retry mechanism in the harness. Every wait has a finite attempt
//! budget and surfaces [`HarnessError::Timeout`] once it is spent.

use std::future::Future;
use std::time::Duration;

use crate::error::{HarnessError, Result};

#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub description: String,
    pub max_attempts: u32,
    pub interval: Duration,
}

impl WaitConfig {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            max_attempts: 30,
            interval: Duration::from_secs(1),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        // A zero budget would never even try once
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Upper bound on the time spent sleeping between attempts
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Polls `check` until it returns true.
pub async fn wait_for<F, Fut>(config: WaitConfig, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for attempt in 1..=config.max_attempts {
        if check().await {
            tracing::debug!("{} ready after {} attempt(s)", config.description, attempt);
            return Ok(());
        }
        if attempt % 10 == 0 {
            tracing::info!(
                "Still waiting for {} (attempt {}/{})",
                config.description,
                attempt,
                config.max_attempts
            );
        }
        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }
    Err(HarnessError::Timeout(config.description))
}

/// Polls `check` until it yields `Some`. Errors from `check` abort the wait.
pub async fn wait_for_result<T, F, Fut>(config: WaitConfig, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 1..=config.max_attempts {
        if let Some(value) = check().await? {
            tracing::debug!("{} ready after {} attempt(s)", config.description, attempt);
            return Ok(value);
        }
        if attempt % 10 == 0 {
            tracing::info!(
                "Still waiting for {} (attempt {}/{})",
                config.description,
                attempt,
                config.max_attempts
            );
        }
        if attempt < config.max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }
    Err(HarnessError::Timeout(config.description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();
        let cfg = WaitConfig::with_description("never")
            .max_attempts(5)
            .interval(Duration::from_secs(2));

        let result = wait_for(cfg, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { false }
        })
        .await;

        assert!(matches!(result, Err(HarnessError::Timeout(ref d)) if d == "never"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_result_returns_value() {
        let calls = AtomicU32::new(0);
        let value = wait_for_result(WaitConfig::with_description("third"), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(if n == 3 { Some(n) } else { None }) }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_result_propagates_errors() {
        let result: Result<()> = wait_for_result(WaitConfig::with_description("err"), || async {
            Err(HarnessError::Exec("boom".into()))
        })
        .await;
        assert!(matches!(result, Err(HarnessError::Exec(_))));
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let cfg = WaitConfig::with_description("x").max_attempts(0);
        assert_eq!(cfg.max_attempts, 1);
        assert_eq!(cfg.budget(), Duration::ZERO);
    }
}
