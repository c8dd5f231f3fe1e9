//! User interaction log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of user action recorded against an audio output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    /// The item was shown in a result list
    Impression,
    /// The item was clicked
    Click,
    /// The item was liked
    Like,
    /// The item was shown and explicitly skipped
    Skip,
    /// The item was played to completion
    PlayComplete,
}

/// Counter deltas applied to item statistics for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionDeltas {
    /// Added to impression_count
    pub impressions: i64,
    /// Added to click_count
    pub clicks: i64,
    /// Added to like_count
    pub likes: i64,
}

impl InteractionAction {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impression => "impression",
            Self::Click => "click",
            Self::Like => "like",
            Self::Skip => "skip",
            Self::PlayComplete => "play_complete",
        }
    }

    /// Counter deltas for this action
    ///
    /// A click is an impression that was also clicked, so both counters
    /// move together. `play_complete` is log-only today: it updates no
    /// counter and exists for future completion-rate signals.
    pub fn deltas(&self) -> InteractionDeltas {
        match self {
            Self::Impression | Self::Skip => InteractionDeltas { impressions: 1, clicks: 0, likes: 0 },
            Self::Click => InteractionDeltas { impressions: 1, clicks: 1, likes: 0 },
            Self::Like => InteractionDeltas { impressions: 0, clicks: 0, likes: 1 },
            Self::PlayComplete => InteractionDeltas { impressions: 0, clicks: 0, likes: 0 },
        }
    }
}

/// One append-only interaction record
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Interaction {
    /// Unique interaction identifier
    pub id: Uuid,

    /// Audio output the action targeted
    pub output_id: Uuid,

    /// Action kind as stored (see [`InteractionAction::as_str`])
    pub action_type: String,

    /// Display position at event time; 0 for non-positional actions
    pub position_shown: i32,

    /// Opaque session identifier
    pub session_id: Option<String>,

    /// Free-form event context
    pub context: Option<serde_json::Value>,

    /// Event timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(InteractionAction::Click.as_str(), "click");
        assert_eq!(InteractionAction::PlayComplete.as_str(), "play_complete");
    }

    #[test]
    fn test_click_increments_both_counters() {
        let deltas = InteractionAction::Click.deltas();
        assert_eq!(deltas.impressions, 1);
        assert_eq!(deltas.clicks, 1);
        assert_eq!(deltas.likes, 0);
    }

    #[test]
    fn test_skip_counts_as_impression_only() {
        let deltas = InteractionAction::Skip.deltas();
        assert_eq!(deltas.impressions, 1);
        assert_eq!(deltas.clicks, 0);
    }

    #[test]
    fn test_like_touches_only_likes() {
        let deltas = InteractionAction::Like.deltas();
        assert_eq!(deltas, InteractionDeltas { impressions: 0, clicks: 0, likes: 1 });
    }

    #[test]
    fn test_play_complete_is_log_only() {
        let deltas = InteractionAction::PlayComplete.deltas();
        assert_eq!(deltas, InteractionDeltas { impressions: 0, clicks: 0, likes: 0 });
    }

    #[test]
    fn test_action_serde_round_trip() {
        let json = serde_json::to_string(&InteractionAction::PlayComplete).unwrap();
        assert_eq!(json, r#""play_complete""#);
        let parsed: InteractionAction = serde_json::from_str(r#""skip""#).unwrap();
        assert_eq!(parsed, InteractionAction::Skip);
    }
}
