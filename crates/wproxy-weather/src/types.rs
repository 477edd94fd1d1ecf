use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw current-conditions document returned by the forecast endpoint.
///
/// Passed through to callers untouched; only the cache serializes it.
pub type ForecastPayload = Value;

/// Geographic coordinates resolved by the geocoding stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Outcome of one orchestrated lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherResult {
    /// Normalized city name (also the cache key suffix)
    pub city: String,
    pub cache_hit: bool,
    pub data: ForecastPayload,
}

/// Geocoding search response
#[derive(Debug, Deserialize)]
pub(crate) struct GeocodingResponse {
    #[serde(default)]
    pub results: Option<Vec<GeocodingMatch>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeocodingMatch {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl GeocodingMatch {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates {
            latitude: self.latitude?,
            longitude: self.longitude?,
        })
    }
}

/// Cache backend errors. Never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
