//! Search HTTP route handler
//!
//! POST /search runs the four-stage pipeline: retrieval → composite
//! ranking → neural rerank → MMR diversity. Each stage is timed and
//! the timings returned so slow stages show up in responses rather
//! than only in traces.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::core::position_bias::PositionBiasCorrector;
use crate::error::{ApiError, ApiResult};
use crate::services::{
    DiversifiedCandidate, DiversityService, NeuralReranker, RankingService, RetrievalService,
    SearchFilters, StatisticsService,
};

/// Maximum accepted query length
const MAX_QUERY_LENGTH: usize = 500;

/// Accepted result list size bounds
const LIMIT_RANGE: std::ops::RangeInclusive<usize> = 1..=100;

/// Accepted BPM filter bounds
const BPM_RANGE: std::ops::RangeInclusive<i32> = 20..=300;

/// Shared state for search handlers
#[derive(Clone)]
pub struct SearchState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Candidate retrieval service
    pub retrieval: RetrievalService,
    /// Composite ranking service
    pub ranking: RankingService,
    /// Neural reranking service
    pub reranker: Arc<NeuralReranker>,
    /// MMR diversity service
    pub diversity: DiversityService,
    /// Statistics service (calibrated propensity lookup)
    pub statistics: StatisticsService,
}

/// Create the search router
pub fn search_router(state: SearchState) -> Router {
    Router::new().route("/", post(search)).with_state(state)
}

/// Search request payload
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    /// Free-text query (1..500 chars)
    pub query: String,
    /// Optional structured filters
    pub filters: Option<SearchFilters>,
    /// Result list size (1..100, default from configuration)
    pub limit: Option<usize>,
    /// Include the per-stage score breakdown
    #[serde(default)]
    pub include_scores: bool,
    /// Opaque session identifier for feedback correlation
    pub session_id: Option<String>,
}

/// Score component breakdown for one result
#[derive(Debug, Serialize)]
pub struct ScoresPayload {
    /// Semantic similarity (0-1)
    pub semantic_score: f64,
    /// Debiased popularity (0-1)
    pub popularity_score: f64,
    /// Exploration score (0-1)
    pub exploration_score: f64,
    /// Freshness decay (0-1)
    pub freshness_score: f64,
    /// Weighted composite score
    pub composite_score: f64,
    /// Raw cross-encoder score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neural_score: Option<f64>,
    /// Blended final score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    /// MMR score at selection time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mmr_score: Option<f64>,
    /// Redundancy to the previously selected set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redundancy_score: Option<f64>,
}

/// One search result
#[derive(Debug, Serialize)]
pub struct SearchResultPayload {
    /// Audio output identifier
    pub output_id: Uuid,
    /// Parent song identifier
    pub song_id: Uuid,
    /// Song title
    pub title: String,
    /// Playable audio URL
    pub audio_url: String,
    /// Primary genre facet
    pub primary_genre: Option<String>,
    /// Primary mood facet
    pub primary_mood: Option<String>,
    /// BPM facet
    pub bpm: Option<i32>,
    /// Musical key facet
    pub musical_key: Option<String>,
    /// Sound-effect description
    pub sounds_description: Option<String>,
    /// Descriptive acoustic prompt
    pub acoustic_prompt_descriptive: Option<String>,
    /// Click counter (only with include_scores)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_count: Option<i64>,
    /// Score breakdown (only with include_scores)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoresPayload>,
    /// 1-based position in the result list
    pub position: usize,
}

/// Search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Original query
    pub query: String,
    /// Ordered results
    pub results: Vec<SearchResultPayload>,
    /// Candidates retrieved before ranking
    pub total_candidates: usize,
    /// Retrieval stage time (ms)
    pub retrieval_ms: f64,
    /// Ranking stage time (ms)
    pub ranking_ms: f64,
    /// Neural rerank stage time (ms)
    pub rerank_ms: f64,
    /// Diversity stage time (ms)
    pub diversity_ms: f64,
    /// Total processing time (ms)
    pub total_ms: f64,
    /// Filters that were applied
    pub filters_applied: Option<SearchFilters>,
}

fn validate(request: &SearchRequest) -> ApiResult<()> {
    let query_chars = request.query.chars().count();
    if query_chars == 0 || query_chars > MAX_QUERY_LENGTH {
        return Err(ApiError::ValidationError(format!(
            "query must be 1..{} characters, got {}",
            MAX_QUERY_LENGTH, query_chars
        )));
    }

    if let Some(limit) = request.limit {
        if !LIMIT_RANGE.contains(&limit) {
            return Err(ApiError::ValidationError(format!(
                "limit must be within {:?}, got {}",
                LIMIT_RANGE, limit
            )));
        }
    }

    if let Some(ref filters) = request.filters {
        for (name, bpm) in [("bpm_min", filters.bpm_min), ("bpm_max", filters.bpm_max)] {
            if let Some(bpm) = bpm {
                if !BPM_RANGE.contains(&bpm) {
                    return Err(ApiError::ValidationError(format!(
                        "{} must be within {:?}, got {}",
                        name, BPM_RANGE, bpm
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Execute a search through the full pipeline
async fn search(
    State(state): State<SearchState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    validate(&request)?;

    let total_start = Instant::now();
    let config = &state.config;
    let limit = request.limit.unwrap_or(config.search.final_result_size);
    let filters = request.filters.clone().unwrap_or_default();

    // The worker may have calibrated fresher propensities than the
    // configured table
    let propensities = state
        .statistics
        .load_position_propensities()
        .await?
        .unwrap_or_else(|| config.position_propensities.clone());
    let corrector = PositionBiasCorrector::new(propensities, config.default_propensity);

    // Stage 1: retrieval
    let stage_start = Instant::now();
    let candidates = state
        .retrieval
        .retrieve(&request.query, &filters, config.search.candidate_pool_size)
        .await?;
    let retrieval_ms = stage_start.elapsed().as_secs_f64() * 1000.0;
    let total_candidates = candidates.len();

    if candidates.is_empty() {
        return Ok(Json(SearchResponse {
            query: request.query,
            results: Vec::new(),
            total_candidates: 0,
            retrieval_ms,
            ranking_ms: 0.0,
            rerank_ms: 0.0,
            diversity_ms: 0.0,
            total_ms: total_start.elapsed().as_secs_f64() * 1000.0,
            filters_applied: request.filters,
        }));
    }

    // Stage 2: composite ranking
    let stage_start = Instant::now();
    let ranked = state
        .ranking
        .rank(candidates, &corrector, config.search.ranking_pool_size);
    let ranking_ms = stage_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 3: neural rerank (fail-soft)
    let stage_start = Instant::now();
    let reranked = state
        .reranker
        .rerank(
            &request.query,
            ranked,
            config.search.rerank_pool_size,
            config.rerank_blend_weight,
        )
        .await;
    let rerank_ms = stage_start.elapsed().as_secs_f64() * 1000.0;

    // Stage 4: MMR diversity
    let stage_start = Instant::now();
    let diversified = state.diversity.diversify(reranked, limit, true);
    let diversity_ms = stage_start.elapsed().as_secs_f64() * 1000.0;

    let results: Vec<SearchResultPayload> = diversified
        .into_iter()
        .enumerate()
        .map(|(i, item)| to_payload(item, i + 1, request.include_scores))
        .collect();

    let total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
    info!(
        results = results.len(),
        total_candidates,
        total_ms,
        "Search completed"
    );

    Ok(Json(SearchResponse {
        query: request.query,
        results,
        total_candidates,
        retrieval_ms,
        ranking_ms,
        rerank_ms,
        diversity_ms,
        total_ms,
        filters_applied: request.filters,
    }))
}

fn to_payload(
    item: DiversifiedCandidate,
    position: usize,
    include_scores: bool,
) -> SearchResultPayload {
    let scores = include_scores.then(|| ScoresPayload {
        semantic_score: item.reranked.scored.scores.semantic_score,
        popularity_score: item.reranked.scored.scores.popularity_score,
        exploration_score: item.reranked.scored.scores.exploration_score,
        freshness_score: item.reranked.scored.scores.freshness_score,
        composite_score: item.reranked.scored.scores.composite_score,
        neural_score: item.reranked.neural_score,
        final_score: Some(item.reranked.final_score),
        mmr_score: item.mmr_score,
        redundancy_score: item.redundancy_score,
    });
    let click_count = include_scores.then_some(item.reranked.scored.candidate.click_count);

    let candidate = item.reranked.scored.candidate;
    SearchResultPayload {
        output_id: candidate.output_id,
        song_id: candidate.song_id,
        title: candidate.title,
        audio_url: candidate.audio_url,
        primary_genre: candidate.primary_genre,
        primary_mood: candidate.primary_mood,
        bpm: candidate.bpm,
        musical_key: candidate.musical_key,
        sounds_description: candidate.sounds_description,
        acoustic_prompt_descriptive: candidate.acoustic_prompt_descriptive,
        click_count,
        scores,
        position,
    }
}
