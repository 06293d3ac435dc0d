//! Conflict retry helper for the service boundary.
//!
//! A mutating call that loses a race on a locked return or ledger row gets
//! one automatic retry with a small jittered delay before the conflict is
//! surfaced to the caller.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::error::{EngineError, Result};

/// Retry policy for concurrency conflicts.
#[derive(Debug, Clone)]
pub struct ConflictRetry {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay before a retry; actual delay is jittered in [base, 2*base).
    pub base_delay: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl ConflictRetry {
    fn jittered_delay(&self) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let jittered = rand::thread_rng().gen_range(base..base * 2.0);
        Duration::from_secs_f64(jittered)
    }

    /// Run `op`, retrying on [`EngineError::ConcurrencyConflict`] up to
    /// `max_retries` times. Any other error is returned immediately.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.jittered_delay();
                    debug!(attempt, ?delay, "retrying after concurrency conflict");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
