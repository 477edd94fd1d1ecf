//! Weather lookups for wproxy
//!
//! Open-Meteo geocoding and forecast calls behind a retry policy and a
//! circuit breaker, fronted by a volatile cache.

pub mod breaker;
pub mod cache;
pub mod client;
pub mod retry;
pub mod service;
pub mod types;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use cache::{CacheStore, InMemoryCache};
pub use client::{OpenMeteoClient, UpstreamConfig};
pub use retry::{with_retry, RetryConfig, Retryable};
pub use service::{WeatherProvider, WeatherService};
pub use types::*;
