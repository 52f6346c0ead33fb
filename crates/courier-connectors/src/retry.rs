//! Retry policy for connector resilience.
//!
//! Provides utilities to handle transient failures in connector operations:
//! - [`RetryPolicy`]: Configurable retry with exponential backoff
//! - [`with_retry_and_handler`]: Async helper that retries operations

use std::future::Future;
use std::time::Duration;

use crate::error::ConnectorError;

/// Retry policy configuration.
///
/// Supports exponential backoff with optional jitter to prevent thundering herd.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial attempt).
    pub max_attempts: usize,
    /// Initial delay before first retry.
    pub initial_backoff: Duration,
    /// Maximum delay between retries.
    pub max_backoff: Duration,
    /// Backoff multiplier (e.g., 2.0 for doubling).
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0) to randomize delays.
    pub jitter: f64,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    #[must_use]
    pub fn new(
        max_attempts: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
        jitter: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            multiplier,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Creates a simple exponential backoff policy.
    ///
    /// Uses a multiplier of 2.0 and 10% jitter.
    #[must_use]
    pub fn exponential(max_attempts: usize, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }

    /// Creates a policy with no retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Returns the policy with its backoff capped at `max_backoff`.
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Calculates the delay for a given attempt number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // attempt count will never exceed i32::MAX
    #[allow(clippy::cast_possible_wrap)] // attempt count is always small positive
    #[allow(clippy::cast_precision_loss)] // acceptable for delay calculation
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt as i32).saturating_sub(1);
        let base_delay = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let clamped = base_delay.min(self.max_backoff.as_secs_f64());

        // Deterministic jitter from the golden ratio sequence.
        let jitter_offset = if self.jitter > 0.0 {
            let pseudo_random = ((attempt as f64 * 0.618_033_988_749_895) % 1.0) * 2.0 - 1.0;
            clamped * self.jitter * pseudo_random
        } else {
            0.0
        };

        Duration::from_secs_f64((clamped + jitter_offset).max(0.0))
    }

    /// Returns `true` if we should retry after the given attempt.
    #[must_use]
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(100))
    }
}

/// Executes an operation with retry, calling an error handler on each failure.
///
/// The error handler receives the attempt number (starting at 0) and the
/// error, allowing logging or metrics collection.
///
/// # Errors
///
/// Returns the last `ConnectorError` after all retry attempts are exhausted.
pub async fn with_retry_and_handler<F, T, Fut, H>(
    policy: &RetryPolicy,
    mut op: F,
    mut on_error: H,
) -> Result<T, ConnectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
    H: FnMut(usize, &ConnectorError),
{
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !policy.should_retry(attempt) => {
                on_error(attempt, &e);
                return Err(e);
            }
            Err(e) => {
                on_error(attempt, &e);
                attempt += 1;
                let delay = policy.delay_for_attempt(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
