//! Shared application state

use std::sync::Arc;

use wproxy_core::{AppError, Settings};
use wproxy_weather::{InMemoryCache, OpenMeteoClient, WeatherService};

/// Handler state. Cheap to clone; everything inside is shared.
#[derive(Clone)]
pub struct AppState {
    pub weather: Arc<WeatherService>,
}

impl AppState {
    pub fn new(weather: Arc<WeatherService>) -> Self {
        Self { weather }
    }

    /// Wire the production graph: one in-memory cache and one Open-Meteo
    /// client (and therefore one circuit breaker) for the whole process.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let client = OpenMeteoClient::from_settings(settings)?;
        let service = WeatherService::new(
            Arc::new(InMemoryCache::new()),
            Arc::new(client),
            settings.cache_ttl(),
        );

        tracing::info!(
            geocoding_url = %settings.geocoding_url,
            forecast_url = %settings.forecast_url,
            cache_ttl_secs = settings.cache_ttl().as_secs(),
            "weather service ready"
        );
        Ok(Self::new(Arc::new(service)))
    }
}
