//! Setlist statistics worker
//!
//! Long-running process closing the offline half of the feedback loop:
//! - periodic CTR posterior refresh over item_statistics
//! - daily position propensity calibration from the interaction log
//!
//! Both write state the API reads on its next request.

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::Config;
use setlist_api::core::position_bias::DEFAULT_PROPENSITIES;
use setlist_api::services::StatisticsService;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "setlist_worker=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    tracing::info!("Starting Setlist worker");

    let config = Config::from_env()?;
    tracing::info!(
        ctr_refresh_secs = config.ctr_refresh_interval_secs,
        calibration_secs = config.calibration_interval_secs,
        "Loaded configuration"
    );

    let db = PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;
    tracing::info!("Connected to PostgreSQL");

    let statistics = StatisticsService::new(
        db,
        config.thompson_prior_alpha,
        config.thompson_prior_beta,
        DEFAULT_PROPENSITIES.iter().copied().collect(),
    );

    let mut ctr_refresh = tokio::time::interval(Duration::from_secs(
        config.ctr_refresh_interval_secs,
    ));
    let mut calibration = tokio::time::interval(Duration::from_secs(
        config.calibration_interval_secs,
    ));

    tracing::info!("Worker is running. Press Ctrl+C to shutdown.");

    loop {
        tokio::select! {
            _ = ctr_refresh.tick() => {
                match statistics.update_ctr_estimates().await {
                    Ok(updated) => tracing::info!(updated, "CTR refresh complete"),
                    Err(e) => tracing::error!(error = %e, "CTR refresh failed"),
                }
            }
            _ = calibration.tick() => {
                match statistics
                    .calibrate_position_propensities(config.calibration_window_days)
                    .await
                {
                    Ok(table) => tracing::info!(positions = table.len(), "Calibration complete"),
                    Err(e) => tracing::error!(error = %e, "Calibration failed"),
                }
            }
            _ = shutdown_signal() => {
                tracing::info!("Shutdown signal received, stopping worker...");
                break;
            }
        }
    }

    tracing::info!("Worker shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
