//! Candidate retrieval over the HNSW vector index
//!
//! One SQL round trip per search: every audio output whose parent song
//! passes the structured filters, left-joined with its engagement
//! counters, ordered by cosine distance to the query embedding. Missing
//! statistics rows surface as zero counters with the prior CTR
//! estimate, so downstream scoring never special-cases new items.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::services::embedding::EmbeddingService;

/// Recognized structured filter options
///
/// Anything else a caller sends is dropped at deserialization; the
/// filter vocabulary is closed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchFilters {
    /// Exact match on primary genre
    pub genre: Option<String>,
    /// Exact match on primary mood
    pub mood: Option<String>,
    /// Exact match on format
    pub format: Option<String>,
    /// Inclusive lower BPM bound
    pub bpm_min: Option<i32>,
    /// Inclusive upper BPM bound
    pub bpm_max: Option<i32>,
}

impl SearchFilters {
    /// Whether any filter is present
    pub fn is_empty(&self) -> bool {
        self.genre.is_none()
            && self.mood.is_none()
            && self.format.is_none()
            && self.bpm_min.is_none()
            && self.bpm_max.is_none()
    }
}

/// One retrieval candidate: song, output, counters and semantic score
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RetrievalCandidate {
    /// Parent song identifier
    pub song_id: Uuid,
    /// Audio output identifier
    pub output_id: Uuid,
    /// Song title
    pub title: String,
    /// Descriptive acoustic prompt
    pub acoustic_prompt_descriptive: Option<String>,
    /// Song embedding (used again by MMR)
    pub embedding: Option<Vector>,
    /// BPM facet
    pub bpm: Option<i32>,
    /// Musical key facet
    pub musical_key: Option<String>,
    /// Primary genre facet
    pub primary_genre: Option<String>,
    /// Primary mood facet
    pub primary_mood: Option<String>,
    /// Format facet
    pub format: Option<String>,
    /// Primary context facet
    pub primary_context: Option<String>,
    /// Song creation timestamp
    pub created_at: Option<DateTime<Utc>>,
    /// Output ordinal within the song
    pub output_number: i32,
    /// Playable audio URL
    pub audio_url: String,
    /// Sound-effect description
    pub sounds_description: Option<String>,
    /// Click counter (0 when no statistics row exists)
    pub click_count: i64,
    /// Impression counter
    pub impression_count: i64,
    /// Like counter
    pub like_count: i64,
    /// Sum of display positions
    pub position_sum: i64,
    /// Pre-computed CTR estimate (prior 0.5 without a row)
    pub ctr_estimate: f64,
    /// Pre-computed CTR variance (prior 0.25 without a row)
    pub ctr_variance: f64,
    /// 1 − cosine distance to the query embedding
    pub semantic_score: f64,
}

const CANDIDATE_COLUMNS: &str = r#"
    s.id AS song_id,
    ao.id AS output_id,
    s.title,
    s.acoustic_prompt_descriptive,
    s.embedding,
    s.bpm,
    s.musical_key,
    s.primary_genre,
    s.primary_mood,
    s.format,
    s.primary_context,
    s.created_at,
    ao.output_number,
    ao.audio_url,
    ao.sounds_description,
    COALESCE(st.click_count, 0) AS click_count,
    COALESCE(st.impression_count, 0) AS impression_count,
    COALESCE(st.like_count, 0) AS like_count,
    COALESCE(st.position_sum, 0) AS position_sum,
    COALESCE(st.ctr_estimate, 0.5) AS ctr_estimate,
    COALESCE(st.ctr_variance, 0.25) AS ctr_variance
"#;

/// HNSW-backed candidate retrieval
#[derive(Clone)]
pub struct RetrievalService {
    db: PgPool,
    embeddings: EmbeddingService,
    ef_search: u32,
}

impl RetrievalService {
    /// Create a retrieval service
    pub fn new(db: PgPool, embeddings: EmbeddingService, ef_search: u32) -> Self {
        Self {
            db,
            embeddings,
            ef_search,
        }
    }

    /// Retrieve up to `limit` candidates for a query
    ///
    /// # Errors
    /// - `ApiError::Embedding` - embedding provider failed after retries
    /// - `ApiError::Database` - ANN query failed
    #[instrument(skip(self, filters), fields(limit))]
    pub async fn retrieve(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> ApiResult<Vec<RetrievalCandidate>> {
        let query_embedding = Vector::from(self.embeddings.embed_query(query).await?);

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(CANDIDATE_COLUMNS);
        builder.push(", 1 - (s.embedding <=> ");
        builder.push_bind(query_embedding.clone());
        builder.push(
            ") AS semantic_score \
             FROM songs s \
             JOIN audio_outputs ao ON ao.song_id = s.id \
             LEFT JOIN item_statistics st ON st.output_id = ao.id \
             WHERE s.embedding IS NOT NULL",
        );

        if let Some(ref genre) = filters.genre {
            builder.push(" AND s.primary_genre = ");
            builder.push_bind(genre.clone());
        }
        if let Some(ref mood) = filters.mood {
            builder.push(" AND s.primary_mood = ");
            builder.push_bind(mood.clone());
        }
        if let Some(ref format) = filters.format {
            builder.push(" AND s.format = ");
            builder.push_bind(format.clone());
        }
        if let Some(bpm_min) = filters.bpm_min {
            builder.push(" AND s.bpm >= ");
            builder.push_bind(bpm_min);
        }
        if let Some(bpm_max) = filters.bpm_max {
            builder.push(" AND s.bpm <= ");
            builder.push_bind(bpm_max);
        }

        builder.push(" ORDER BY s.embedding <=> ");
        builder.push_bind(query_embedding);
        builder.push(" LIMIT ");
        builder.push_bind(limit);

        // SET LOCAL scopes the traversal width to this transaction
        let mut tx = self.db.begin().await?;
        sqlx::query(&format!("SET LOCAL hnsw.ef_search = {}", self.ef_search))
            .execute(&mut *tx)
            .await?;
        let candidates: Vec<RetrievalCandidate> =
            builder.build_query_as().fetch_all(&mut *tx).await?;
        tx.commit().await?;

        info!(count = candidates.len(), "Retrieved candidates");
        Ok(candidates)
    }

    /// Retrieve specific outputs by id, skipping ANN and filters
    ///
    /// The rows share the retrieval candidate shape; `semantic_score`
    /// is 0 since there is no query.
    #[instrument(skip(self, output_ids), fields(count = output_ids.len()))]
    pub async fn retrieve_by_ids(
        &self,
        output_ids: &[Uuid],
    ) -> ApiResult<Vec<RetrievalCandidate>> {
        if output_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(CANDIDATE_COLUMNS);
        builder.push(
            ", 0.0::float8 AS semantic_score \
             FROM songs s \
             JOIN audio_outputs ao ON ao.song_id = s.id \
             LEFT JOIN item_statistics st ON st.output_id = ao.id \
             WHERE ao.id = ANY(",
        );
        builder.push_bind(output_ids.to_vec());
        builder.push(")");

        let candidates: Vec<RetrievalCandidate> =
            builder.build_query_as().fetch_all(&self.db).await?;
        Ok(candidates)
    }
}
