//! Retry with capped, full-jitter exponential backoff.
//!
//! One policy serves every retriable operation in the pipeline; callers pick
//! a preset (or build their own) and wrap the operation in [`RetryPolicy::run`].
//! Errors decide for themselves whether another attempt can help by
//! implementing [`Retryable`]; non-retriable errors short-circuit.
//!
//! ```no_run
//! use vox_retry::{RetryPolicy, Retryable};
//!
//! #[derive(Debug)]
//! struct Flaky;
//! impl Retryable for Flaky {
//!     fn is_retriable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn demo() -> Result<(), Flaky> {
//! let policy = RetryPolicy::default();
//! policy.run("fetch", || async { Err::<(), _>(Flaky) }).await
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Whether a failed operation may succeed if attempted again with the same
/// inputs.
pub trait Retryable {
    fn is_retriable(&self) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Patient schedule for embedding-API calls, which rate-limit for longer
    /// than most transient faults last.
    pub fn embedding() -> Self {
        Self {
            max_attempts: 5,
            cap: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Schedule for stream publishes.
    pub fn publish() -> Self {
        Self::default()
    }

    /// Upper bound of the jitter window before attempt `attempt` (1-indexed):
    /// `min(cap, base * 2^(attempt-1))`.
    pub fn window(&self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(16);
        let scaled = self.base.saturating_mul(1u32 << pow);
        scaled.min(self.cap)
    }

    /// Draws the delay before attempt `attempt`: uniform in `[0, window]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let window = self.window(attempt).as_millis() as u64;
        if window == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=window))
    }

    /// Runs `op` until it succeeds, fails terminally, or the attempt budget
    /// is spent. The first attempt runs immediately; each retry sleeps a
    /// jittered delay first.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        op = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = ?err,
                        "retriable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
