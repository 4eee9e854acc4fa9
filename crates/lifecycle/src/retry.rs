//! Bounded retry with pure exponential backoff.
//!
//! Deliberately jitter-free so the delay schedule is deterministic for
//! tests: with the default base of 1000 ms the waits before attempts 2..5
//! are exactly 1 s, 2 s, 4 s and 8 s.

use std::future::Future;
use std::time::Duration;

use sg_domain::config::LifecycleConfig;
use sg_domain::error::Result;

/// Wraps a fallible async operation with bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(cfg: &LifecycleConfig) -> Self {
        Self::new(cfg.max_retry_attempts, cfg.retry_base_delay())
    }

    /// The delay slept before the given attempt (1-indexed; attempt 1 has
    /// no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_delay * 2u32.pow(attempt - 2)
    }

    /// Execute `op` up to `max_attempts` times. On final failure the last
    /// observed error is propagated; callers convert it into a typed
    /// in-band result rather than raising further.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            attempts = attempt,
                            error = %err,
                            "retry budget exhausted"
                        );
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt + 1);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(1_000))
    }
}
