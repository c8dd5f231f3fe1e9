//! Song model with vector embedding

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Song record from the songs table
///
/// Immutable after ingestion except `extended_metadata`. The embedding
/// covers the descriptive text and backs the HNSW index used for
/// candidate retrieval.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Song {
    /// Unique song identifier
    pub id: Uuid,

    /// Song title
    pub title: String,

    /// Original generation prompt
    pub prompt: Option<String>,

    /// Lyrics, when present
    pub lyrics: Option<String>,

    /// Descriptive acoustic prompt used for embedding and reranking
    pub acoustic_prompt_descriptive: Option<String>,

    /// Semantic embedding over the descriptive text
    #[serde(skip_serializing)]
    pub embedding: Option<Vector>,

    /// Beats per minute
    pub bpm: Option<i32>,

    /// Musical key (e.g., "C minor")
    pub musical_key: Option<String>,

    /// Primary genre facet
    pub primary_genre: Option<String>,

    /// Primary mood facet
    pub primary_mood: Option<String>,

    /// Format facet (e.g., MUSIC, SFX)
    pub format: Option<String>,

    /// Primary usage context facet
    pub primary_context: Option<String>,

    /// Vocal gender facet
    pub vocal_gender: Option<String>,

    /// Free-form tag bag and ingestion leftovers
    pub extended_metadata: Option<serde_json::Value>,

    /// Ingestion timestamp
    pub created_at: DateTime<Utc>,
}
