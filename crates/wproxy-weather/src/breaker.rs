//! Circuit breaker guarding one upstream client.
//!
//! ```text
//! Closed -> Open:   consecutive_failures reaches failure_threshold
//! Open   -> (call): reset_timeout elapsed since opened_at; next call passes
//! (call) -> Closed: that call succeeds
//! (call) -> Open:   that call fails, opened_at refreshed
//! ```
//!
//! There is no observable half-open state.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use wproxy_core::AppError;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(10);

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit rejects calls once open
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }
}

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        if self.is_open() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// True while the cooldown after the last tripping failure is running.
    pub fn is_open(&self) -> bool {
        let state = self.state.lock();
        match state.opened_at {
            Some(opened) => opened.elapsed() < self.config.reset_timeout,
            None => false,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Run `op` unless the circuit is open.
    ///
    /// Only retryable errors (5xx, timeouts, transport failures) count as
    /// failures. Terminal errors mean the upstream answered coherently, so
    /// they reset the counter like a success.
    ///
    /// Upstream 5xx responses count as failures on purpose: a service that
    /// keeps answering 5xx is treated the same as one that is unreachable.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if self.is_open() {
            tracing::debug!("circuit open, rejecting upstream call");
            return Err(AppError::circuit_open());
        }

        let result = op().await;
        match &result {
            Err(e) if e.is_retryable() => self.record_failure(),
            _ => self.record_success(),
        }
        result
    }

    fn record_success(&self) {
        let mut state = self.state.lock();
        if state.opened_at.take().is_some() {
            tracing::info!("circuit closed after successful upstream call");
        }
        state.consecutive_failures = 0;
    }

    fn record_failure(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        if state.consecutive_failures >= self.config.failure_threshold {
            state.opened_at = Some(Instant::now());
            tracing::warn!(
                consecutive_failures = state.consecutive_failures,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "circuit opened"
            );
        }
    }
}
