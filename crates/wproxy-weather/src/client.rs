//! Open-Meteo client: place name -> coordinates -> current conditions.
//!
//! Each stage is retried independently and every attempt goes through the
//! same circuit breaker, so geocoding and forecast failures share one budget.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::instrument;
use wproxy_core::{AppError, ErrorDetails, ReqwestErrorExt, Settings};

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::retry::{with_retry, RetryConfig};
use crate::service::WeatherProvider;
use crate::types::{Coordinates, ForecastPayload, GeocodingResponse};

const USER_AGENT: &str = "wproxy/0.1.0";
const GEOCODING: &str = "geocoding";
const FORECAST: &str = "forecast";
const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,weather_code";

/// Endpoints, timeout and breaker settings for one client instance
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub geocoding_url: String,
    pub forecast_url: String,
    /// Budget for each individual HTTP request
    pub timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl UpstreamConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            geocoding_url: settings.geocoding_url.clone(),
            forecast_url: settings.forecast_url.clone(),
            timeout: settings.upstream_timeout(),
            breaker: CircuitBreakerConfig::new(
                settings.circuit_breaker_failure_threshold,
                settings.circuit_breaker_reset_timeout(),
            ),
        }
    }
}

/// Open-Meteo client with retry and circuit breaker.
///
/// Build one per process and share it; the breaker state lives here.
#[derive(Debug)]
pub struct OpenMeteoClient {
    http: Client,
    geocoding_url: String,
    forecast_url: String,
    timeout: Duration,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl OpenMeteoClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            geocoding_url: config.geocoding_url,
            forecast_url: config.forecast_url,
            timeout: config.timeout,
            breaker: CircuitBreaker::new(config.breaker),
            retry: RetryConfig::default(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        Self::new(UpstreamConfig::from_settings(settings))
    }

    /// Replace the default retry policy (3 attempts, 1s..10s backoff).
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Resolve `city` and fetch its current conditions.
    ///
    /// Errors are the classified failure of whichever stage failed last.
    pub async fn fetch_weather(&self, city: &str) -> Result<ForecastPayload, AppError> {
        let coords = self.geocode(city).await?;
        self.forecast(coords).await
    }

    #[instrument(name = "geocoding", skip(self))]
    pub async fn geocode(&self, city: &str) -> Result<Coordinates, AppError> {
        with_retry(&self.retry, GEOCODING, || {
            self.breaker.execute(|| self.geocode_once(city))
        })
        .await
    }

    #[instrument(
        name = "forecast",
        skip(self),
        fields(latitude = coords.latitude, longitude = coords.longitude)
    )]
    pub async fn forecast(&self, coords: Coordinates) -> Result<ForecastPayload, AppError> {
        with_retry(&self.retry, FORECAST, || {
            self.breaker.execute(|| self.forecast_once(coords))
        })
        .await
    }

    async fn geocode_once(&self, city: &str) -> Result<Coordinates, AppError> {
        let started = Instant::now();
        let response = self
            .http
            .get(&self.geocoding_url)
            .query(&[("name", city), ("count", "1"), ("language", "en"), ("format", "json")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(GEOCODING, e))?;

        let status = response.status();
        log_completed(GEOCODING, status, started);

        match status.as_u16() {
            200 => {
                let body: GeocodingResponse = read_json(GEOCODING, response).await?;
                let first = body
                    .results
                    .and_then(|results| results.into_iter().next())
                    .ok_or_else(|| city_not_found(city))?;

                let coords = first.coordinates().ok_or_else(|| {
                    malformed(GEOCODING, "first result has no numeric latitude/longitude")
                })?;
                tracing::debug!(
                    resolved = first.name.as_deref().unwrap_or("-"),
                    latitude = coords.latitude,
                    longitude = coords.longitude,
                    "city resolved"
                );
                Ok(coords)
            }
            400..=499 => Err(city_not_found(city)),
            code @ 500..=u16::MAX => Err(AppError::upstream(format!(
                "Upstream geocoding error (status {})",
                code
            ))
            .with_status(code)
            .with_details(status_details(code))),
            code => Err(AppError::upstream("Upstream error during geocoding")
                .with_details(status_details(code))),
        }
    }

    async fn forecast_once(&self, coords: Coordinates) -> Result<ForecastPayload, AppError> {
        let started = Instant::now();
        let response = self
            .http
            .get(&self.forecast_url)
            .query(&[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(FORECAST, e))?;

        let status = response.status();
        log_completed(FORECAST, status, started);

        match status.as_u16() {
            200 => read_json::<Value>(FORECAST, response).await,
            code @ 500..=u16::MAX => Err(AppError::upstream(format!(
                "Upstream forecast error (status {})",
                code
            ))
            .with_status(code)
            .with_details(status_details(code))),
            // Never surface an upstream 4xx as our own status: callers would
            // read it as a problem with their request.
            code @ 400..=499 => Err(AppError::upstream(
                "Upstream forecast service returned client error",
            )
            .with_details(status_details(code))
            .non_retryable()),
            code => Err(AppError::upstream("Upstream error during forecast fetch")
                .with_details(status_details(code))),
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn get_weather(&self, city: &str) -> Result<ForecastPayload, AppError> {
        self.fetch_weather(city).await
    }
}

fn log_completed(stage: &'static str, status: StatusCode, started: Instant) {
    tracing::info!(
        stage,
        upstream_status_code = status.as_u16(),
        upstream_duration_ms = started.elapsed().as_secs_f64() * 1000.0,
        "{}_request_completed",
        stage
    );
}

fn transport_error(stage: &'static str, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        tracing::error!(stage, "{}_timeout", stage);
    } else {
        tracing::error!(stage, error = %err, "{}_request_error", stage);
    }
    err.into_upstream_error(stage)
}

async fn read_json<T: DeserializeOwned>(stage: &'static str, response: Response) -> Result<T, AppError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(stage, e))?;
    serde_json::from_slice(&bytes).map_err(|e| malformed(stage, e))
}

fn city_not_found(city: &str) -> AppError {
    AppError::NotFound(format!("City '{}' not found", city))
}

fn malformed(stage: &str, reason: impl std::fmt::Display) -> AppError {
    let mut details = ErrorDetails::new();
    details.insert("reason".to_string(), Value::String(reason.to_string()));
    AppError::upstream(format!("Malformed upstream {} response", stage))
        .with_details(details)
        .non_retryable()
}

fn status_details(code: u16) -> ErrorDetails {
    let mut details = ErrorDetails::new();
    details.insert("upstream_status_code".to_string(), Value::from(code));
    details
}
