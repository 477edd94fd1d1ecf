use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Env var naming an alternate settings file.
pub const CONFIG_PATH_ENV: &str = "WPROXY_CONFIG";
/// Settings file looked up in the working directory when `WPROXY_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "wproxy.toml";

pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Upper bound for any configured duration (one year).
pub const MAX_DURATION_SECONDS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a single-line summary of all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected text or json", other)),
        }
    }
}

/// Process settings, loaded once at startup.
///
/// Sources in increasing precedence: built-in defaults, an optional TOML file,
/// environment variables (case-insensitive, e.g. `CACHE_TTL_SECONDS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Deployment label, only used in logs
    pub environment: String,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,

    /// `text` or `json`
    pub log_format: String,

    /// Listen address for the HTTP server
    pub bind_addr: String,

    /// Budget for every single upstream request, in seconds
    pub upstream_timeout_seconds: f64,

    /// Lifetime of cached forecasts. Zero or negative stores indefinitely.
    pub cache_ttl_seconds: i64,

    /// Consecutive upstream failures before the breaker opens
    pub circuit_breaker_failure_threshold: u32,

    /// Seconds the breaker stays open before letting a call through
    pub circuit_breaker_reset_timeout_seconds: f64,

    /// Place-name search endpoint
    pub geocoding_url: String,

    /// Current-conditions endpoint
    pub forecast_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            upstream_timeout_seconds: 10.0,
            cache_ttl_seconds: 300,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_reset_timeout_seconds: 10.0,
            geocoding_url: DEFAULT_GEOCODING_URL.to_string(),
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the settings file (if present) and the process environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_sources(Some(&path), Environment::default())
    }

    /// Load settings and validate them
    ///
    /// Any error aborts loading; warnings are returned for the caller to log.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let settings = Self::load()?;
        let validation = settings.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        Ok((settings, validation))
    }

    /// Build settings from an optional TOML file and an environment source.
    pub fn from_sources(file: Option<&str>, env: Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
        }

        builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Failed to parse settings")
    }

    pub fn upstream_timeout(&self) -> Duration {
        secs_to_duration(self.upstream_timeout_seconds)
    }

    /// Cache TTL; `Duration::ZERO` means entries never expire.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds.max(0).unsigned_abs())
    }

    pub fn circuit_breaker_reset_timeout(&self) -> Duration {
        secs_to_duration(self.circuit_breaker_reset_timeout_seconds)
    }

    /// Parsed log format, falling back to text when invalid.
    pub fn log_format(&self) -> LogFormat {
        self.log_format.parse().unwrap_or_default()
    }

    /// Validate the settings
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if validate_seconds(
            self.upstream_timeout_seconds,
            "upstream_timeout_seconds",
            &mut result,
        ) && self.upstream_timeout_seconds > 60.0
        {
            result.add_warning(
                "upstream_timeout_seconds",
                "Upstream timeout is unusually large (>60s)",
            );
        }

        if self.cache_ttl_seconds <= 0 {
            result.add_warning(
                "cache_ttl_seconds",
                "Cache TTL is not positive; cached forecasts will never expire",
            );
        } else if self.cache_ttl_seconds as f64 > MAX_DURATION_SECONDS {
            result.add_error(
                "cache_ttl_seconds",
                format!("Cache TTL must not exceed {} seconds", MAX_DURATION_SECONDS),
            );
        }

        if self.circuit_breaker_failure_threshold == 0 {
            result.add_error(
                "circuit_breaker_failure_threshold",
                "Failure threshold must be at least 1",
            );
        }

        validate_seconds(
            self.circuit_breaker_reset_timeout_seconds,
            "circuit_breaker_reset_timeout_seconds",
            &mut result,
        );

        if let Err(e) = self.bind_addr.parse::<SocketAddr>() {
            result.add_error("bind_addr", format!("Invalid socket address: {}", e));
        }

        if let Err(e) = self.log_format.parse::<LogFormat>() {
            result.add_error("log_format", e);
        }

        validate_url(&self.geocoding_url, "geocoding_url", &mut result);
        validate_url(&self.forecast_url, "forecast_url", &mut result);

        result
    }
}

/// Non-positive and NaN map to zero; anything too large for `Duration` saturates.
fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Require a finite, positive number of seconds no larger than
/// `MAX_DURATION_SECONDS`. Returns whether the value passed.
fn validate_seconds(value: f64, field: &str, result: &mut ValidationResult) -> bool {
    if !value.is_finite() {
        result.add_error(field, "Must be a finite number of seconds");
        false
    } else if value <= 0.0 {
        result.add_error(field, "Must be greater than 0");
        false
    } else if value > MAX_DURATION_SECONDS {
        result.add_error(
            field,
            format!("Must not exceed {} seconds", MAX_DURATION_SECONDS),
        );
        false
    } else {
        true
    }
}

/// Validate a URL field
fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }

            if url.port() == Some(0) {
                result.add_error(field_name, "Port cannot be 0");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
