//! Cache-aside weather lookups.
//!
//! The cache is an accelerator: any failure reading, decoding or writing it
//! is logged and the lookup carries on as if the entry were absent.
//! Provider errors always propagate unchanged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use wproxy_core::AppError;

use crate::cache::CacheStore;
use crate::types::{CacheError, ForecastPayload, WeatherResult};

/// Anything that can produce a forecast document for a normalized city name.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn get_weather(&self, city: &str) -> Result<ForecastPayload, AppError>;
}

pub struct WeatherService {
    cache: Arc<dyn CacheStore>,
    provider: Arc<dyn WeatherProvider>,
    ttl: Duration,
}

impl WeatherService {
    /// `ttl` of zero caches entries without expiry.
    pub fn new(cache: Arc<dyn CacheStore>, provider: Arc<dyn WeatherProvider>, ttl: Duration) -> Self {
        Self { cache, provider, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Trim surrounding whitespace and lowercase.
    pub fn normalize_city(city: &str) -> String {
        city.trim().to_lowercase()
    }

    pub fn cache_key(normalized_city: &str) -> String {
        format!("weather:{}", normalized_city)
    }

    /// Serve from cache when possible, otherwise ask the provider and
    /// remember its answer.
    ///
    /// Concurrent misses for the same city each reach the provider.
    pub async fn get_weather(&self, city: &str) -> Result<WeatherResult, AppError> {
        let city = Self::normalize_city(city);
        let key = Self::cache_key(&city);

        if let Some(data) = self.cached(&key).await {
            tracing::debug!(%key, "cache hit");
            return Ok(WeatherResult {
                city,
                cache_hit: true,
                data,
            });
        }

        let data = self.provider.get_weather(&city).await?;
        self.remember(&key, &data).await;

        Ok(WeatherResult {
            city,
            cache_hit: false,
            data,
        })
    }

    async fn cached(&self, key: &str) -> Option<ForecastPayload> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::error!(key, error = %e, "cache_get_failed");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(data @ Value::Object(_)) => Some(data),
            Ok(_) => {
                tracing::error!(key, "cache_decode_failed: cached value is not a JSON object");
                None
            }
            Err(e) => {
                tracing::error!(key, error = %e, "cache_decode_failed");
                None
            }
        }
    }

    async fn remember(&self, key: &str, data: &ForecastPayload) {
        let stored = match serde_json::to_string(data) {
            Ok(raw) => self.cache.set(key, raw, self.ttl).await,
            Err(e) => Err(CacheError::from(e)),
        };

        if let Err(e) = stored {
            tracing::error!(key, error = %e, "cache_set_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Cache double that can be told to fail on either operation.
    #[derive(Default)]
    struct FakeCache {
        inner: InMemoryCache,
        fail_get: bool,
        fail_set: bool,
        sets: AtomicU32,
    }

    #[async_trait]
    impl CacheStore for FakeCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            if self.fail_get {
                return Err(CacheError::Unavailable("get exploded".into()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.fail_set {
                return Err(CacheError::Unavailable("set exploded".into()));
            }
            self.inner.set(key, value, ttl).await
        }
    }

    struct CountingProvider {
        calls: AtomicU32,
        last_city: parking_lot::Mutex<Option<String>>,
        outcome: Result<ForecastPayload, AppError>,
    }

    impl CountingProvider {
        fn ok(data: Value) -> Self {
            Self {
                calls: AtomicU32::new(0),
                last_city: parking_lot::Mutex::new(None),
                outcome: Ok(data),
            }
        }

        fn failing(err: AppError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                last_city: parking_lot::Mutex::new(None),
                outcome: Err(err),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for CountingProvider {
        async fn get_weather(&self, city: &str) -> Result<ForecastPayload, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_city.lock() = Some(city.to_string());
            self.outcome.clone()
        }
    }

    fn sample() -> Value {
        json!({"current": {"temperature_2m": 16.8, "relative_humidity_2m": 48, "weather_code": 2}})
    }

    fn service(cache: Arc<dyn CacheStore>, provider: Arc<CountingProvider>) -> WeatherService {
        WeatherService::new(cache, provider, Duration::from_secs(300))
    }

    #[test]
    fn test_normalize_and_key() {
        assert_eq!(WeatherService::normalize_city("  Tel Aviv "), "tel aviv");
        assert_eq!(WeatherService::cache_key("tel aviv"), "weather:tel aviv");
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = Arc::new(InMemoryCache::new());
        let provider = Arc::new(CountingProvider::ok(sample()));
        let svc = service(cache.clone(), provider.clone());

        let first = svc.get_weather("Tel Aviv").await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.city, "tel aviv");
        assert_eq!(first.data, sample());
        assert_eq!(provider.last_city.lock().as_deref(), Some("tel aviv"));

        let second = svc.get_weather("  TEL AVIV").await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.data, sample());
        assert_eq!(provider.calls(), 1);

        let raw = cache.get("weather:tel aviv").await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&raw).unwrap(), sample());
    }

    #[tokio::test]
    async fn test_provider_error_propagates_and_is_not_cached() {
        let cache = Arc::new(InMemoryCache::new());
        let provider = Arc::new(CountingProvider::failing(AppError::NotFound(
            "City 'atlantis' not found".into(),
        )));
        let svc = service(cache.clone(), provider.clone());

        let err = svc.get_weather("Atlantis").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(cache.is_empty());

        svc.get_weather("Atlantis").await.unwrap_err();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_get_failure_falls_through_to_provider() {
        let cache = Arc::new(FakeCache {
            fail_get: true,
            ..FakeCache::default()
        });
        let provider = Arc::new(CountingProvider::ok(sample()));
        let svc = service(cache.clone(), provider.clone());

        let result = svc.get_weather("Paris").await.unwrap();
        assert!(!result.cache_hit);
        assert_eq!(provider.calls(), 1);
        assert_eq!(cache.sets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_set_failure_still_returns_data() {
        let cache = Arc::new(FakeCache {
            fail_set: true,
            ..FakeCache::default()
        });
        let provider = Arc::new(CountingProvider::ok(sample()));
        let svc = service(cache, provider.clone());

        let result = svc.get_weather("Paris").await.unwrap();
        assert!(!result.cache_hit);
        assert_eq!(result.data, sample());

        // Nothing was stored, so the next lookup misses again.
        svc.get_weather("Paris").await.unwrap();
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_a_miss_and_gets_overwritten() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .set("weather:oslo", "{not json".into(), Duration::ZERO)
            .await
            .unwrap();
        let provider = Arc::new(CountingProvider::ok(sample()));
        let svc = service(cache.clone(), provider.clone());

        let result = svc.get_weather("Oslo").await.unwrap();
        assert!(!result.cache_hit);
        assert_eq!(provider.calls(), 1);

        let raw = cache.get("weather:oslo").await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&raw).unwrap(), sample());
    }

    #[tokio::test]
    async fn test_non_object_cache_entry_is_a_miss() {
        let cache = Arc::new(InMemoryCache::new());
        cache
            .set("weather:oslo", "[1, 2, 3]".into(), Duration::ZERO)
            .await
            .unwrap();
        let provider = Arc::new(CountingProvider::ok(sample()));
        let svc = service(cache, provider.clone());

        assert!(!svc.get_weather("oslo").await.unwrap().cache_hit);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = Arc::new(InMemoryCache::new());
        let provider = Arc::new(CountingProvider::ok(sample()));
        let svc = WeatherService::new(cache, provider.clone(), Duration::from_secs(10));

        svc.get_weather("rome").await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(svc.get_weather("rome").await.unwrap().cache_hit);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!svc.get_weather("rome").await.unwrap().cache_hit);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_still_serves_and_caches() {
        let cache = Arc::new(InMemoryCache::new());
        let provider = Arc::new(CountingProvider::ok(sample()));
        let svc = WeatherService::new(cache, provider.clone(), Duration::MAX);
        assert_eq!(svc.ttl(), Duration::MAX);

        assert!(!svc.get_weather("lima").await.unwrap().cache_hit);
        assert!(svc.get_weather("lima").await.unwrap().cache_hit);
        assert_eq!(provider.calls(), 1);
    }
}
