//! Bounded retries with exponential backoff.
//!
//! Retried:
//! - upstream timeouts
//! - transport failures and 5xx responses
//!
//! Not retried:
//! - "not found" lookups
//! - upstream 4xx on the forecast stage
//! - an open circuit breaker

use std::future::Future;
use std::time::Duration;

use wproxy_core::AppError;

/// Default retry configuration
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MULTIPLIER: Duration = Duration::from_secs(1);
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Failures that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        AppError::is_retryable(self)
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base of the exponential delay
    pub multiplier: Duration,
    /// Lower clamp for a single delay
    pub min_delay: Duration,
    /// Upper clamp for a single delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            multiplier: DEFAULT_MULTIPLIER,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings
    pub fn new(max_attempts: u32, multiplier: Duration, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            multiplier,
            min_delay,
            max_delay,
        }
    }

    /// Delay to wait after the given 1-based attempt failed.
    ///
    /// `multiplier * 2^(attempt - 1)`, clamped to `[min_delay, max_delay]`.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let raw = self.multiplier.saturating_mul(factor);
        raw.max(self.min_delay).min(self.max_delay.max(self.min_delay))
    }
}

/// Run `operation` with retries.
///
/// Returns the first success, the first non-retryable error, or the error
/// of the final attempt. The caller always sees the underlying failure.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, name: &str, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = name, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                tracing::debug!(operation = name, attempt, error = %e, "non-retryable error");
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(
                    operation = name,
                    attempts = attempt,
                    error = %e,
                    "all retry attempts exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_after_attempt(attempt);
                tracing::warn!(
                    operation = name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
