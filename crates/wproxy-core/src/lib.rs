pub mod config;
pub mod error;

pub use config::{LogFormat, Settings, ValidationResult};
pub use error::{AppError, ErrorDetails, ReqwestErrorExt};

use anyhow::Result;

/// Initialize tracing/logging
///
/// `RUST_LOG` wins over `level` when set. Calling this more than once is harmless.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if installed.is_ok() {
        tracing::info!(level, ?format, "logging initialized");
    }
    Ok(())
}
