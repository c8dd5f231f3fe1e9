//! Audio output model

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One renderable audio artifact of a song
///
/// A song owns an ordered sequence of outputs (typically two).
/// Deleting the song cascades to its outputs and their statistics.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AudioOutput {
    /// Unique output identifier
    pub id: Uuid,

    /// Parent song identifier
    pub song_id: Uuid,

    /// Ordinal within the song's outputs (1-based)
    pub output_number: i32,

    /// Playable audio URL
    pub audio_url: String,

    /// Sound-effect description, when present
    pub sounds_description: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}
