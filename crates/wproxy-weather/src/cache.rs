//! Volatile key/value cache with per-entry expiry.
//!
//! Best-effort accelerator only: entries are purged lazily on read and
//! nothing survives a restart.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::types::CacheError;

/// Async cache contract consumed by the weather service.
///
/// A `ttl` of `Duration::ZERO` stores the value indefinitely.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Never,
    At(Instant),
}

#[derive(Debug)]
struct CacheEntry {
    value: String,
    expires_at: Expiry,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        match self.expires_at {
            Expiry::Never => true,
            Expiry::At(at) => now < at,
        }
    }
}

/// Process-local cache guarded by a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entries, including expired ones not yet purged by a read.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let value = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_live(now).then(|| entry.value.clone()),
        };

        if value.is_none() {
            entries.remove(key);
            tracing::debug!(key, "cache entry expired");
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        // A TTL past the end of the clock is as good as forever.
        let expires_at = if ttl.is_zero() {
            Expiry::Never
        } else {
            Instant::now().checked_add(ttl).map_or(Expiry::Never, Expiry::At)
        };

        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cache_set_and_get() {
        let cache = InMemoryCache::new();
        cache.set("key1", "value1".into(), Duration::from_secs(3600)).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap().as_deref(), Some("value1"));
    }

    #[tokio::test]
    async fn test_cache_get_nonexistent_key() {
        let cache = InMemoryCache::new();
        assert!(cache.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_overwrite() {
        let cache = InMemoryCache::new();
        cache.set("key", "value1".into(), Duration::from_secs(3600)).await.unwrap();
        cache.set("key", "value2".into(), Duration::from_secs(3600)).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap().as_deref(), Some("value2"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_visible_until_ttl_boundary() {
        let cache = InMemoryCache::new();
        cache.set("temp", "data".into(), Duration::from_secs(10)).await.unwrap();

        assert_eq!(cache.get("temp").await.unwrap().as_deref(), Some("data"));

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert_eq!(cache.get("temp").await.unwrap().as_deref(), Some("data"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get("temp").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_purged_on_read() {
        let cache = InMemoryCache::new();
        cache.set("temp", "data".into(), Duration::from_secs(1)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        // Still stored until someone reads it.
        assert_eq!(cache.len(), 1);

        assert!(cache.get("temp").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let cache = InMemoryCache::new();
        cache.set("persist", "forever".into(), Duration::ZERO).await.unwrap();

        tokio::time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
        assert_eq!(cache.get("persist").await.unwrap().as_deref(), Some("forever"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() {
        let cache = InMemoryCache::new();
        cache.set("key", "old".into(), Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.set("key", "new".into(), Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(cache.get("key").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = InMemoryCache::new();
        cache.set("huge", "data".into(), Duration::MAX).await.unwrap();

        tokio::time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
        assert_eq!(cache.get("huge").await.unwrap().as_deref(), Some("data"));
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let cache = InMemoryCache::new();
        let payload = serde_json::json!({
            "current": {"temperature_2m": 16.8, "relative_humidity_2m": 48, "weather_code": 2}
        });

        cache
            .set("weather:tel aviv", serde_json::to_string(&payload).unwrap(), Duration::from_secs(300))
            .await
            .unwrap();
        let raw = cache.get("weather:tel aviv").await.unwrap().unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(decoded, payload);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_do_not_corrupt_entries() {
        let cache = Arc::new(InMemoryCache::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("city-{}", i % 4);
                cache.set(&key, format!("value-{}", i), Duration::ZERO).await.unwrap();
                cache.get(&key).await.unwrap()
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert!(value.starts_with("value-"));
        }
        assert_eq!(cache.len(), 4);
    }
}
