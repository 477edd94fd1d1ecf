//! HTTP handlers

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use wproxy_core::AppError;
use wproxy_weather::WeatherResult;

use crate::error::ApiError;
use crate::middleware::RequestId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub city: Option<String>,
}

/// Liveness probe. Never touches upstream.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /weather?city=<name>`
pub async fn weather(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    query: Result<Query<WeatherQuery>, QueryRejection>,
) -> Result<Json<WeatherResult>, ApiError> {
    let city = match query {
        Ok(Query(WeatherQuery { city: Some(city) })) if !city.trim().is_empty() => city,
        Ok(_) => {
            return Err(ApiError::new(
                AppError::Validation("Query parameter 'city' is required".to_string()),
                &request_id,
            ))
        }
        Err(rejection) => {
            return Err(ApiError::new(
                AppError::Validation(rejection.body_text()),
                &request_id,
            ))
        }
    };

    let result = state
        .weather
        .get_weather(&city)
        .await
        .map_err(|e| ApiError::new(e, &request_id))?;

    tracing::info!(city = %result.city, cache_hit = result.cache_hit, "weather served");
    Ok(Json(result))
}
