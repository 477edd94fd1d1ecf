//! Error responses for the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use wproxy_core::AppError;

use crate::middleware::RequestId;

/// An `AppError` bound to the request it failed.
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error: AppError, request_id: &RequestId) -> Self {
        Self {
            error,
            request_id: request_id.to_string(),
        }
    }
}

/// `{"error": {...}}` envelope returned for every failure.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub status_code: u16,
    pub request_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.error.status_code();
        let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.error.is_expected() {
            tracing::warn!(
                error_code = self.error.code(),
                status_code,
                details = ?self.error.details(),
                "application_error: {}",
                self.error
            );
        } else {
            tracing::error!(error = %self.error, "unhandled_error");
        }

        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.error.code(),
                message: self.error.public_message(),
                status_code: status.as_u16(),
                request_id: self.request_id,
            },
        };
        (status, Json(body)).into_response()
    }
}
