use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{BackendError, GenerationError};
use crate::domain::models::RetryConfig;
use crate::domain::ports::Sleeper;

/// Retry policy with exponential backoff for rate-limited generation calls
///
/// The delay after a transient failure on attempt `a` (0-indexed) is
/// `base_delay * 2^a`: 1s → 2s → 4s → 8s with the defaults.
///
/// # Retry Decision
/// - Retry on: rate limiting / resource exhaustion
/// - Do NOT retry: anything else
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    max_attempts: u32,
    /// Delay after the first transient failure
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts, at least 1 (0 is treated as 1)
    /// * `base_delay` - Delay after the first transient failure
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the attempt following a transient failure on `attempt`
    ///
    /// Formula: base_delay * 2^attempt, saturating
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }

    /// Whether a failure on `attempt` (0-indexed) should be retried
    pub fn should_retry(&self, error: &BackendError, attempt: u32) -> bool {
        error.is_transient() && attempt + 1 < self.max_attempts
    }

    /// Execute an operation with exponential backoff retry logic
    ///
    /// # Returns
    /// * `Ok(T)` - Operation succeeded
    /// * `Err(GenerationError::Backend)` - A fatal error, returned immediately
    /// * `Err(GenerationError::RateLimited)` - Every attempt was rate limited
    pub async fn execute<F, Fut, T>(
        &self,
        sleeper: &dyn Sleeper,
        mut operation: F,
    ) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Generation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_transient() => {
                    debug!(error = %err, "Permanent error, not retrying");
                    return Err(GenerationError::Backend(err.to_string()));
                }
                Err(err) => {
                    if !self.should_retry(&err, attempt) {
                        warn!(
                            attempts = self.max_attempts,
                            error = %err,
                            "Max retries exceeded for rate limiting"
                        );
                        return Err(GenerationError::RateLimited {
                            attempts: self.max_attempts,
                        });
                    }

                    let backoff = self.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Rate limit hit, retrying"
                    );

                    sleeper.sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    /// 5 attempts, 1 second base delay
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
