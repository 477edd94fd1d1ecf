//! Centralized error taxonomy for the weather proxy.
//!
//! Every failure that reaches a caller is one of a small set of stable kinds:
//! - each kind has a machine-readable `code()` and an external `status_code()`
//! - upstream kinds carry a retryability flag consumed by the retry policy
//! - internal defects never leak their message past `public_message()`

use serde_json::{Map, Value};
use thiserror::Error;

/// Structured, log-safe details attached to an upstream error.
pub type ErrorDetails = Map<String, Value>;

/// Message returned to callers for internal defects.
pub const INTERNAL_ERROR_MESSAGE: &str = "Unexpected error occurred.";

/// Top-level application error type.
///
/// Upstream classification failures travel unmodified from the upstream
/// client through the orchestrator to the HTTP boundary.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// Malformed caller input.
    #[error("{0}")]
    Validation(String),

    /// Place name resolved to nothing (or the geocoder rejected it).
    #[error("{0}")]
    NotFound(String),

    /// Upstream returned an error status or a malformed response.
    #[error("{message}")]
    Upstream {
        message: String,
        status_code: u16,
        details: Option<ErrorDetails>,
        retryable: bool,
    },

    /// Upstream call exceeded the timeout budget.
    #[error("{0}")]
    UpstreamTimeout(String),

    /// Breaker is open; upstream was not contacted.
    #[error("{0}")]
    CircuitOpen(String),

    /// Anything not matching the kinds above.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Retryable upstream error with the default 502 status.
    pub fn upstream(message: impl Into<String>) -> Self {
        AppError::Upstream {
            message: message.into(),
            status_code: 502,
            details: None,
            retryable: true,
        }
    }

    pub fn upstream_timeout(message: impl Into<String>) -> Self {
        AppError::UpstreamTimeout(message.into())
    }

    pub fn circuit_open() -> Self {
        AppError::CircuitOpen("Upstream service unavailable (circuit open)".to_string())
    }

    /// Override the external status of an upstream error. No-op for other kinds.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        if let AppError::Upstream { status_code, .. } = &mut self {
            *status_code = status;
        }
        self
    }

    /// Attach structured details to an upstream error. No-op for other kinds.
    #[must_use]
    pub fn with_details(mut self, extra: ErrorDetails) -> Self {
        if let AppError::Upstream { details, .. } = &mut self {
            details.get_or_insert_with(Map::new).extend(extra);
        }
        self
    }

    /// Mark an upstream error as terminal for the retry policy.
    #[must_use]
    pub fn non_retryable(mut self) -> Self {
        if let AppError::Upstream { retryable, .. } = &mut self {
            *retryable = false;
        }
        self
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Upstream { .. } | AppError::UpstreamTimeout(_) => "upstream_error",
            AppError::CircuitOpen(_) => "circuit_breaker_open",
            AppError::Internal(_) => "internal_server_error",
        }
    }

    /// External HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Upstream { status_code, .. } => *status_code,
            AppError::UpstreamTimeout(_) => 504,
            AppError::CircuitOpen(_) => 503,
            AppError::Internal(_) => 500,
        }
    }

    /// Whether another attempt may succeed. Only upstream kinds are ever retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Upstream { retryable, .. } => *retryable,
            AppError::UpstreamTimeout(_) => true,
            _ => false,
        }
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            AppError::Upstream { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    /// Message suitable for an API response.
    ///
    /// Internal defects are replaced with a generic message.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// True for errors the caller is expected to see in normal operation.
    pub fn is_expected(&self) -> bool {
        !matches!(self, AppError::Internal(_))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", e))
    }
}

/// Extension trait for classifying reqwest transport failures.
pub trait ReqwestErrorExt {
    /// `stage` names the upstream call, e.g. "geocoding" or "forecast".
    fn into_upstream_error(self, stage: &str) -> AppError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_upstream_error(self, stage: &str) -> AppError {
        if self.is_timeout() {
            AppError::upstream_timeout(format!("Upstream {} service timeout", stage))
        } else {
            let mut details = ErrorDetails::new();
            details.insert("reason".to_string(), Value::String(self.to_string()));
            AppError::upstream(format!("Upstream {} service error", stage)).with_details(details)
        }
    }
}
