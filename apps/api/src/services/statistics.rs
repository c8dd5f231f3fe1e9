//! Statistics aggregation and calibration
//!
//! The offline-friendly half of the feedback loop: periodic CTR
//! posterior refresh, position propensity calibration from the
//! interaction log, and global aggregates for diagnostics. The
//! calibrated propensity table is persisted so the next search request
//! ranks with it.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::core::position_bias::{calibrate_propensities, PositionCounts};
use crate::error::ApiResult;

/// ranking_settings key holding the calibrated propensity table
pub const PROPENSITIES_SETTING_KEY: &str = "position_propensities";

/// Positions considered during calibration
const CALIBRATION_MAX_POSITION: u32 = 20;

/// Global engagement aggregates
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    /// Highest click count across items
    pub max_clicks: i64,
    /// Mean click count across items
    pub avg_clicks: f64,
    /// Total clicks
    pub total_clicks: i64,
    /// Total impressions
    pub total_impressions: i64,
    /// Items with a statistics row
    pub total_items: i64,
    /// Raw global click-through rate
    pub global_ctr: f64,
}

/// Metric for top-item queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopItemsMetric {
    /// Order by click count
    Clicks,
    /// Order by impression count
    Impressions,
    /// Order by CTR estimate
    Ctr,
}

/// One row of a top-items report
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TopItem {
    /// Song title
    pub title: String,
    /// Audio output identifier
    pub output_id: Uuid,
    /// Playable audio URL
    pub audio_url: String,
    /// Click counter
    pub click_count: i64,
    /// Impression counter
    pub impression_count: i64,
    /// Pre-computed CTR estimate
    pub ctr_estimate: f64,
}

/// Statistics service
#[derive(Clone)]
pub struct StatisticsService {
    db: PgPool,
    prior_alpha: f64,
    prior_beta: f64,
    fallback_propensities: HashMap<u32, f64>,
}

impl StatisticsService {
    /// Create a statistics service
    ///
    /// `fallback_propensities` is returned by calibration when the log
    /// has no usable position-1 clicks and no table was persisted yet.
    pub fn new(
        db: PgPool,
        prior_alpha: f64,
        prior_beta: f64,
        fallback_propensities: HashMap<u32, f64>,
    ) -> Self {
        Self {
            db,
            prior_alpha,
            prior_beta,
            fallback_propensities,
        }
    }

    /// Global engagement aggregates
    ///
    /// # Errors
    /// - `ApiError::Database` - the aggregate query failed
    #[instrument(skip(self))]
    pub async fn get_global_stats(&self) -> ApiResult<GlobalStats> {
        let row: (Option<i64>, Option<f64>, Option<i64>, Option<i64>, i64) = sqlx::query_as(
            r#"
            SELECT
                MAX(click_count),
                AVG(click_count)::float8,
                SUM(click_count)::int8,
                SUM(impression_count)::int8,
                COUNT(output_id)
            FROM item_statistics
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let total_clicks = row.2.unwrap_or(0);
        let total_impressions = row.3.unwrap_or(0);

        Ok(GlobalStats {
            max_clicks: row.0.unwrap_or(0),
            avg_clicks: row.1.unwrap_or(0.0),
            total_clicks,
            total_impressions,
            total_items: row.4,
            global_ctr: if total_impressions > 0 {
                total_clicks as f64 / total_impressions as f64
            } else {
                0.0
            },
        })
    }

    /// Refresh the pre-computed CTR posterior for every observed item
    ///
    /// Sets `ctr_estimate` to the posterior mean and `ctr_variance` to
    /// the posterior variance under the configured Beta prior. Returns
    /// the number of rows updated.
    ///
    /// # Errors
    /// - `ApiError::Database` - the update failed
    #[instrument(skip(self))]
    pub async fn update_ctr_estimates(&self) -> ApiResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE item_statistics
            SET
                ctr_estimate = ($1 + click_count) / ($1 + $2 + impression_count),
                ctr_variance = (($1 + click_count) * ($2 + impression_count - click_count))
                             / (power($1 + $2 + impression_count, 2)
                                * ($1 + $2 + impression_count + 1)),
                stats_updated_at = NOW()
            WHERE impression_count > 0
            "#,
        )
        .bind(self.prior_alpha)
        .bind(self.prior_beta)
        .execute(&self.db)
        .await?;

        let updated = result.rows_affected();
        info!(updated, "Updated CTR estimates");
        Ok(updated)
    }

    /// Click/impression counts per display position over the last
    /// `days` days
    ///
    /// Covers positions 1..=20; impressions count click, impression and
    /// skip events.
    ///
    /// # Errors
    /// - `ApiError::Database` - the grouped query failed
    pub async fn get_position_click_distribution(
        &self,
        days: i64,
    ) -> ApiResult<HashMap<u32, PositionCounts>> {
        let cutoff = Utc::now() - Duration::days(days);

        let rows: Vec<(i32, i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                position_shown,
                COUNT(*) FILTER (WHERE action_type = 'click'),
                COUNT(*) FILTER (WHERE action_type IN ('click', 'impression', 'skip'))
            FROM interactions
            WHERE created_at >= $1
              AND position_shown BETWEEN 1 AND $2
              AND action_type IN ('click', 'impression', 'skip')
            GROUP BY position_shown
            "#,
        )
        .bind(cutoff)
        .bind(CALIBRATION_MAX_POSITION as i32)
        .fetch_all(&self.db)
        .await?;

        let mut distribution: HashMap<u32, PositionCounts> = (1..=CALIBRATION_MAX_POSITION)
            .map(|position| (position, PositionCounts::default()))
            .collect();
        for (position, clicks, impressions) in rows {
            distribution.insert(position as u32, PositionCounts { clicks, impressions });
        }

        Ok(distribution)
    }

    /// Calibrate the propensity table from recent click data and
    /// persist it for the search path
    ///
    /// `propensity[pos] = ctr[pos] / ctr[1]`. Without position-1 clicks
    /// the previously persisted table (or the configured fallback) is
    /// retained.
    ///
    /// # Errors
    /// - `ApiError::Database` - log read or settings write failed
    #[instrument(skip(self))]
    pub async fn calibrate_position_propensities(
        &self,
        days: i64,
    ) -> ApiResult<HashMap<u32, f64>> {
        let distribution = self.get_position_click_distribution(days).await?;

        let previous = self
            .load_position_propensities()
            .await?
            .unwrap_or_else(|| self.fallback_propensities.clone());

        let calibrated = calibrate_propensities(&distribution, &previous);

        sqlx::query(
            r#"
            INSERT INTO ranking_settings (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = $2, updated_at = NOW()
            "#,
        )
        .bind(PROPENSITIES_SETTING_KEY)
        .bind(serde_json::to_value(&calibrated)?)
        .execute(&self.db)
        .await?;

        info!(positions = calibrated.len(), "Calibrated position propensities");
        Ok(calibrated)
    }

    /// Load the persisted propensity table, if any
    ///
    /// # Errors
    /// - `ApiError::Database` - the settings read failed
    pub async fn load_position_propensities(&self) -> ApiResult<Option<HashMap<u32, f64>>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT value FROM ranking_settings WHERE key = $1")
                .bind(PROPENSITIES_SETTING_KEY)
                .fetch_optional(&self.db)
                .await?;

        match row {
            Some((value,)) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Top items by an engagement metric
    ///
    /// # Errors
    /// - `ApiError::Database` - the report query failed
    pub async fn get_top_items(
        &self,
        limit: i64,
        metric: TopItemsMetric,
    ) -> ApiResult<Vec<TopItem>> {
        let order_column = match metric {
            TopItemsMetric::Clicks => "st.click_count",
            TopItemsMetric::Impressions => "st.impression_count",
            TopItemsMetric::Ctr => "st.ctr_estimate",
        };

        let sql = format!(
            r#"
            SELECT s.title, ao.id AS output_id, ao.audio_url,
                   st.click_count, st.impression_count, st.ctr_estimate
            FROM item_statistics st
            JOIN audio_outputs ao ON ao.id = st.output_id
            JOIN songs s ON s.id = ao.song_id
            ORDER BY {} DESC
            LIMIT $1
            "#,
            order_column
        );

        let items: Vec<TopItem> = sqlx::query_as(&sql).bind(limit).fetch_all(&self.db).await?;
        Ok(items)
    }
}
