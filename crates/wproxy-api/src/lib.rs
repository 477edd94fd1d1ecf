//! HTTP surface for wproxy
//!
//! `GET /health` and `GET /weather?city=` behind request-id middleware.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;

pub use error::{ApiError, ErrorBody, ErrorEnvelope};
pub use middleware::{RequestId, REQUEST_ID_HEADER};
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/weather", get(routes::weather))
        .layer(axum::middleware::from_fn(middleware::track_request))
        .with_state(state)
}
