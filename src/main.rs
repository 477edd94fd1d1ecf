use anyhow::{Context, Result};
use tokio::net::TcpListener;
use wproxy_api::{router, AppState};
use wproxy_core::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    let (settings, validation) = Settings::load_validated()?;
    wproxy_core::init_logging(&settings.log_level, settings.log_format())?;

    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    let state = AppState::from_settings(&settings).context("Failed to build application state")?;
    let app = router(state);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;

    tracing::info!(
        environment = %settings.environment,
        addr = %settings.bind_addr,
        "wproxy started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("wproxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
