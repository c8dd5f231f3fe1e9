//! Worker configuration

use anyhow::Result;
use setlist_shared_config::{parse_env, DatabaseConfig};

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Seconds between CTR posterior refreshes (default: 15 minutes)
    pub ctr_refresh_interval_secs: u64,

    /// Seconds between propensity calibrations (default: 24 hours)
    pub calibration_interval_secs: u64,

    /// Days of interaction history used for calibration
    pub calibration_window_days: i64,

    /// Thompson sampling prior alpha
    pub thompson_prior_alpha: f64,

    /// Thompson sampling prior beta
    pub thompson_prior_beta: f64,
}

impl Config {
    /// Load worker configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!("{}", e))?,
            ctr_refresh_interval_secs: parse_env("CTR_REFRESH_INTERVAL", 900)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            calibration_interval_secs: parse_env("CALIBRATION_INTERVAL", 86_400)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            calibration_window_days: parse_env("CALIBRATION_WINDOW_DAYS", 30)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            thompson_prior_alpha: parse_env("THOMPSON_PRIOR_ALPHA", 1.0)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            thompson_prior_beta: parse_env("THOMPSON_PRIOR_BETA", 1.0)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
        })
    }
}
