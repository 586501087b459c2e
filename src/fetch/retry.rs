//! Retry budget and backoff for chunk workers.
//!
//! Every failed chunk attempt is treated as transient: the worker retries
//! until the budget is spent. The delay grows linearly with the attempt
//! number and carries a small random jitter so chunks that failed together
//! (a server blip) do not all retry in the same instant.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use chunkfetch_core::fetch::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::ZERO);
//! assert_eq!(policy.max_attempts(), 4);
//!
//! match policy.should_retry(1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(1));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { .. } => unreachable!(),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::constants::{DEFAULT_RETRIES, DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_JITTER};

/// Decision on whether to retry a failed chunk attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Give up on the chunk.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Per-chunk retry configuration.
///
/// # Delay Calculation
///
/// ```text
/// delay = base_delay * attempt + uniform(0..=max_jitter)
/// ```
///
/// With the defaults (1s base, 250ms jitter) the waits are roughly 1s, 2s, 3s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    retries: u32,
    /// Delay unit multiplied by the attempt number.
    base_delay: Duration,
    /// Upper bound on random jitter.
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `retries` retries after the first attempt.
    #[must_use]
    pub fn new(retries: u32, base_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            retries,
            base_delay,
            max_jitter,
        }
    }

    /// Retries allowed after the first attempt.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Decides what to do after `attempt` (1-indexed) has failed.
    #[instrument(level = "trace", skip(self), fields(max_attempts = self.max_attempts()))]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts() {
            debug!(attempt, "retry budget exhausted");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts()),
            };
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(attempt),
            attempt: attempt + 1,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt) + self.calculate_jitter()
    }

    fn calculate_jitter(&self) -> Duration {
        if self.max_jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
        Duration::from_millis(jitter_ms)
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
///
/// Returns `true` if the full delay elapsed, `false` if the sleep was cut
/// short by cancellation.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}
