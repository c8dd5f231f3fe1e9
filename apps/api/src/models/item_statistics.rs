//! Item engagement statistics model

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Hot engagement counters for one audio output
///
/// Kept in a separate table (1:1 with `audio_outputs`) so feedback
/// UPSERTs never touch catalog rows. Created lazily on the first
/// interaction; `ctr_estimate` and `ctr_variance` are recomputed by the
/// periodic statistics refresh, never by the feedback path.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ItemStatistics {
    /// Audio output identifier (primary key)
    pub output_id: Uuid,

    /// Impressions (click, impression and skip events)
    pub impression_count: i64,

    /// Clicks
    pub click_count: i64,

    /// Likes
    pub like_count: i64,

    /// Sum of display positions across impressions
    pub position_sum: i64,

    /// Pre-computed posterior CTR point estimate
    pub ctr_estimate: f64,

    /// Pre-computed posterior CTR variance
    pub ctr_variance: f64,

    /// Timestamp of the last interaction
    pub last_interaction: Option<DateTime<Utc>>,

    /// Timestamp of the last statistics recomputation
    pub stats_updated_at: DateTime<Utc>,
}

impl ItemStatistics {
    /// Mean display position, 0.0 before any impression
    pub fn average_position(&self) -> f64 {
        if self.impression_count == 0 {
            0.0
        } else {
            self.position_sum as f64 / self.impression_count as f64
        }
    }

    /// Smoothed CTR under a Beta(alpha, beta) prior
    pub fn posterior_ctr(&self, alpha: f64, beta: f64) -> f64 {
        let a = alpha + self.click_count as f64;
        let b = beta + (self.impression_count - self.click_count).max(0) as f64;
        a / (a + b)
    }

    /// Posterior CTR variance under a Beta(alpha, beta) prior
    pub fn posterior_variance(&self, alpha: f64, beta: f64) -> f64 {
        let a = alpha + self.click_count as f64;
        let b = beta + (self.impression_count - self.click_count).max(0) as f64;
        let total = a + b;
        (a * b) / (total * total * (total + 1.0))
    }
}
