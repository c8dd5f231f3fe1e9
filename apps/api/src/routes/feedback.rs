//! Feedback HTTP route handlers
//!
//! POST /feedback/{output_id} records a user action; the counter
//! update is atomic under concurrency. GET /feedback/{output_id}/stats
//! returns the current counters.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::InteractionAction;
use crate::services::FeedbackService;

/// Accepted display position bounds
const POSITION_RANGE: std::ops::RangeInclusive<i32> = 0..=100;

/// Maximum accepted session id length
const MAX_SESSION_ID_LENGTH: usize = 100;

/// Shared state for feedback handlers
#[derive(Clone)]
pub struct FeedbackState {
    /// Feedback recording service
    pub feedback: FeedbackService,
}

/// Create the feedback router
pub fn feedback_router(state: FeedbackState) -> Router {
    Router::new()
        .route("/:output_id", post(record_feedback))
        .route("/:output_id/stats", get(get_stats))
        .with_state(state)
}

/// Feedback request payload
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    /// User action; impressions are recorded by the search caller in
    /// batch, not through this endpoint
    pub action: InteractionAction,
    /// Display position at event time (0 for non-positional actions)
    pub position_shown: Option<i32>,
    /// Opaque session identifier
    pub session_id: Option<String>,
    /// Free-form event context
    pub context: Option<serde_json::Value>,
}

/// Feedback response
#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    /// Whether the interaction was recorded
    pub success: bool,
    /// New interaction log row id
    pub interaction_id: Uuid,
    /// Target audio output
    pub output_id: Uuid,
    /// Recorded action
    pub action: InteractionAction,
    /// Event timestamp
    pub recorded_at: DateTime<Utc>,
    /// Click counter after the write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_clicks: Option<i64>,
    /// Impression counter after the write
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_impressions: Option<i64>,
}

/// Statistics response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Audio output identifier
    pub output_id: Uuid,
    /// Click counter
    pub click_count: i64,
    /// Impression counter
    pub impression_count: i64,
    /// Like counter
    pub like_count: i64,
    /// Pre-computed CTR estimate
    pub ctr_estimate: f64,
    /// Mean display position
    pub average_position: Option<f64>,
    /// Timestamp of the last interaction
    pub last_interaction: Option<DateTime<Utc>>,
}

fn validate(request: &FeedbackRequest) -> ApiResult<()> {
    if request.action == InteractionAction::Impression {
        return Err(ApiError::ValidationError(
            "action must be one of click, like, skip, play_complete".to_string(),
        ));
    }

    if let Some(position) = request.position_shown {
        if !POSITION_RANGE.contains(&position) {
            return Err(ApiError::ValidationError(format!(
                "position_shown must be within {:?}, got {}",
                POSITION_RANGE, position
            )));
        }
    }

    if let Some(ref session_id) = request.session_id {
        if session_id.len() > MAX_SESSION_ID_LENGTH {
            return Err(ApiError::ValidationError(format!(
                "session_id must be at most {} characters",
                MAX_SESSION_ID_LENGTH
            )));
        }
    }

    Ok(())
}

/// Record user feedback (click, like, skip, play_complete)
async fn record_feedback(
    State(state): State<FeedbackState>,
    Path(output_id): Path<Uuid>,
    Json(request): Json<FeedbackRequest>,
) -> ApiResult<Json<FeedbackResponse>> {
    validate(&request)?;

    let recorded = state
        .feedback
        .record_interaction(
            output_id,
            request.action,
            request.position_shown.unwrap_or(0),
            request.session_id.as_deref(),
            request.context,
        )
        .await?;

    let stats = state.feedback.get_output_stats(output_id).await?;

    Ok(Json(FeedbackResponse {
        success: true,
        interaction_id: recorded.interaction_id,
        output_id,
        action: recorded.action,
        recorded_at: recorded.recorded_at,
        current_clicks: stats.as_ref().map(|s| s.click_count),
        current_impressions: stats.as_ref().map(|s| s.impression_count),
    }))
}

/// Get engagement statistics for an output
async fn get_stats(
    State(state): State<FeedbackState>,
    Path(output_id): Path<Uuid>,
) -> ApiResult<Json<StatsResponse>> {
    let stats = state
        .feedback
        .get_output_stats(output_id)
        .await?
        .ok_or_else(|| ApiError::not_found("statistics", output_id.to_string()))?;

    let average_position =
        (stats.impression_count > 0).then(|| stats.average_position());

    Ok(Json(StatsResponse {
        output_id: stats.output_id,
        click_count: stats.click_count,
        impression_count: stats.impression_count,
        like_count: stats.like_count,
        ctr_estimate: stats.ctr_estimate,
        average_position,
        last_interaction: stats.last_interaction,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action: InteractionAction) -> FeedbackRequest {
        FeedbackRequest {
            action,
            position_shown: None,
            session_id: None,
            context: None,
        }
    }

    #[test]
    fn test_validate_rejects_impression_action() {
        assert!(validate(&request(InteractionAction::Impression)).is_err());
        assert!(validate(&request(InteractionAction::Click)).is_ok());
        assert!(validate(&request(InteractionAction::PlayComplete)).is_ok());
    }

    #[test]
    fn test_validate_position_bounds() {
        let mut req = request(InteractionAction::Click);
        req.position_shown = Some(-1);
        assert!(validate(&req).is_err());
        req.position_shown = Some(100);
        assert!(validate(&req).is_ok());
        req.position_shown = Some(101);
        assert!(validate(&req).is_err());
    }

    #[test]
    fn test_validate_session_id_length() {
        let mut req = request(InteractionAction::Like);
        req.session_id = Some("s".repeat(101));
        assert!(validate(&req).is_err());
        req.session_id = Some("s".repeat(100));
        assert!(validate(&req).is_ok());
    }
}
