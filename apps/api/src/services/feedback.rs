//! Feedback recording service
//!
//! Every interaction does two writes in one transaction: an
//! append-only log INSERT and an UPSERT of the per-output counters.
//! Concurrent writers against the same output are serialized by the
//! UPSERT's conflict resolution on the primary key, so no delta is ever
//! lost or applied twice. Either both writes commit or neither does.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{InteractionAction, ItemStatistics};

/// Receipt for one recorded interaction
#[derive(Debug, Clone)]
pub struct RecordedInteraction {
    /// New interaction log row id
    pub interaction_id: Uuid,
    /// Target audio output
    pub output_id: Uuid,
    /// Recorded action
    pub action: InteractionAction,
    /// Display position at event time
    pub position_shown: i32,
    /// Event timestamp
    pub recorded_at: DateTime<Utc>,
}

/// Feedback recording and stats lookup
#[derive(Clone)]
pub struct FeedbackService {
    db: PgPool,
}

impl FeedbackService {
    /// Create a feedback service
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record one interaction
    ///
    /// # Errors
    /// - `ApiError::NotFound` - the output does not exist
    /// - `ApiError::Database` - the transaction failed
    #[instrument(skip(self, context), fields(action = action.as_str()))]
    pub async fn record_interaction(
        &self,
        output_id: Uuid,
        action: InteractionAction,
        position_shown: i32,
        session_id: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> ApiResult<RecordedInteraction> {
        let now = Utc::now();
        let deltas = action.deltas();

        let result = async {
            let mut tx = self.db.begin().await?;

            let (interaction_id,): (Uuid,) = sqlx::query_as(
                r#"
                INSERT INTO interactions
                    (output_id, action_type, position_shown, session_id, context, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                "#,
            )
            .bind(output_id)
            .bind(action.as_str())
            .bind(position_shown)
            .bind(session_id)
            .bind(context.unwrap_or_else(|| serde_json::json!({})))
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO item_statistics
                    (output_id, impression_count, click_count, like_count, position_sum,
                     ctr_estimate, ctr_variance, last_interaction, stats_updated_at)
                VALUES ($1, $2, $3, $4, $5, 0.5, 0.25, $6, $6)
                ON CONFLICT (output_id) DO UPDATE SET
                    impression_count = item_statistics.impression_count + $2,
                    click_count = item_statistics.click_count + $3,
                    like_count = item_statistics.like_count + $4,
                    position_sum = item_statistics.position_sum + $5,
                    last_interaction = $6,
                    stats_updated_at = $6
                "#,
            )
            .bind(output_id)
            .bind(deltas.impressions)
            .bind(deltas.clicks)
            .bind(deltas.likes)
            .bind(i64::from(position_shown))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok::<Uuid, ApiError>(interaction_id)
        }
        .await;

        let interaction_id = result.map_err(|e| {
            if e.is_foreign_key_violation() {
                ApiError::not_found("audio output", output_id.to_string())
            } else {
                e
            }
        })?;

        info!(%output_id, position = position_shown, "Recorded interaction");

        Ok(RecordedInteraction {
            interaction_id,
            output_id,
            action,
            position_shown,
            recorded_at: now,
        })
    }

    /// Record impressions for the items of a returned result list
    ///
    /// Called by the search caller with each output's display position.
    pub async fn record_batch_impressions(
        &self,
        items: &[(Uuid, i32)],
        session_id: Option<&str>,
    ) -> ApiResult<usize> {
        let mut count = 0;
        for &(output_id, position) in items {
            self.record_interaction(
                output_id,
                InteractionAction::Impression,
                position,
                session_id,
                None,
            )
            .await?;
            count += 1;
        }
        Ok(count)
    }

    /// Current counters for an output, None before any interaction
    ///
    /// # Errors
    /// - `ApiError::Database` - the lookup failed
    pub async fn get_output_stats(&self, output_id: Uuid) -> ApiResult<Option<ItemStatistics>> {
        let stats: Option<ItemStatistics> = sqlx::query_as(
            r#"
            SELECT output_id, impression_count, click_count, like_count, position_sum,
                   ctr_estimate, ctr_variance, last_interaction, stats_updated_at
            FROM item_statistics
            WHERE output_id = $1
            "#,
        )
        .bind(output_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(stats)
    }
}
