//! Generic retry wrapper with exponential backoff and jitter.
//!
//! [`RetryExecutor`] runs a fallible async operation up to a caller-chosen
//! number of attempts, sleeping `min(base_delay * 2^(attempt-1), max_delay)`
//! plus up to 25% random jitter between attempts. It is a pure wrapper: it
//! knows nothing about circuit breakers or mirror health; callers compose
//! those around it.
//!
//! # Example
//!
//! ```no_run
//! use bookstore_core::retry::RetryExecutor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let retry = RetryExecutor::new();
//! let value: u32 = retry
//!     .execute(|| async { Ok::<_, std::io::Error>(7) }, "demo operation", 3)
//!     .await?;
//! assert_eq!(value, 7);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum attempts (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay before the first retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default cap on the computed backoff delay (jitter may exceed it by 25%).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(8);

/// Fraction of the computed delay added as random jitter (up to 25%).
const JITTER_FRACTION: f64 = 0.25;

/// All attempts of an operation failed; wraps the last underlying error.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempts: {source}")]
pub struct RetryExhausted<E>
where
    E: std::error::Error + 'static,
{
    /// Human-readable name of the operation that was retried.
    pub operation: String,
    /// How many attempts were made.
    pub attempts: u32,
    /// The error from the final attempt.
    #[source]
    pub source: E,
}

/// Exponential-backoff executor for fallible async operations.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor {
    /// Creates an executor with the default delay schedule (500ms base, 8s cap).
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Creates an executor with a custom delay schedule (mostly for tests).
    #[must_use]
    pub fn with_delays(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Runs `operation` up to `max_attempts` times.
    ///
    /// Sleeps between failed attempts according to the backoff schedule. A
    /// `max_attempts` of 0 is treated as 1.
    ///
    /// # Errors
    ///
    /// Returns [`RetryExhausted`] naming the operation and wrapping the error
    /// from the final attempt.
    pub async fn execute<T, E, F, Fut>(
        &self,
        mut operation: F,
        operation_name: &str,
        max_attempts: u32,
    ) -> Result<T, RetryExhausted<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt >= max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %error,
                            "all attempts exhausted"
                        );
                        return Err(RetryExhausted {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            source: error,
                        });
                    }

                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "attempt failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Computes the sleep before the retry following failed attempt `attempt`.
    ///
    /// Formula: `min(base_delay * 2^(attempt-1), max_delay)` plus random
    /// jitter of up to 25% of that capped value.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Exponent is clamped so large attempt counts cannot overflow the math.
        let exponent = attempt.saturating_sub(1).min(16);
        let raw_ms = self.base_delay.as_millis() as f64 * 2f64.powi(exponent as i32);
        let capped_ms = raw_ms.min(self.max_delay.as_millis() as f64);

        let jitter_ms = rand::thread_rng().gen_range(0.0..=capped_ms * JITTER_FRACTION);
        Duration::from_millis((capped_ms + jitter_ms) as u64)
    }
}
