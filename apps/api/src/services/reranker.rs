//! Neural reranking with a cross-encoder scorer
//!
//! A fail-soft stage: any trouble here (no backend configured, pool too
//! small, scorer error) degrades to composite-score ordering. Only the
//! retrieval and feedback paths are allowed to fail a request.

use std::sync::Arc;

use setlist_inference_client::RerankClient;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument};

use crate::services::ranking::ScoredCandidate;
use crate::services::retrieval::RetrievalCandidate;

/// Pools smaller than this skip reranking; the composite order is
/// already trustworthy at that size and the model call is not free
const MIN_RERANK_POOL: usize = 10;

/// Cross-encoder backend capability
pub enum RerankerBackend {
    /// HTTP scorer speaking the `/rerank` contract
    Http(RerankClient),
    /// No backend; the stage is a pass-through
    Disabled,
}

/// A candidate after the rerank stage
#[derive(Debug, Clone)]
pub struct RerankedCandidate {
    /// The composite-scored candidate
    pub scored: ScoredCandidate,
    /// Raw cross-encoder score, None when the stage was skipped
    pub neural_score: Option<f64>,
    /// Blend of normalized neural score and composite score
    pub final_score: f64,
}

impl RerankedCandidate {
    /// Convenience accessor for the retrieval fields
    pub fn candidate(&self) -> &RetrievalCandidate {
        &self.scored.candidate
    }
}

/// Neural reranking service
pub struct NeuralReranker {
    backend: RerankerBackend,
    /// Bounds concurrent scorer calls across requests
    semaphore: Arc<Semaphore>,
}

impl NeuralReranker {
    /// Create a reranker over the given backend
    pub fn new(backend: RerankerBackend, max_concurrency: usize) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Whether a scoring backend is configured
    pub fn is_enabled(&self) -> bool {
        matches!(self.backend, RerankerBackend::Http(_))
    }

    /// Rerank candidates, blending neural and composite scores
    ///
    /// Returns at most `top_k` candidates sorted by `final_score`
    /// descending. Never fails: every error path falls back to the
    /// composite ordering.
    #[instrument(skip(self, candidates), fields(count = candidates.len(), top_k, blend_weight))]
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<ScoredCandidate>,
        top_k: usize,
        blend_weight: f64,
    ) -> Vec<RerankedCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let client = match &self.backend {
            RerankerBackend::Http(client) => client,
            RerankerBackend::Disabled => {
                debug!("Neural reranking disabled");
                return passthrough(candidates, top_k);
            }
        };

        if candidates.len() < MIN_RERANK_POOL {
            info!(count = candidates.len(), "Pool too small, skipping rerank");
            return passthrough(candidates, top_k);
        }

        let passages: Vec<String> = candidates
            .iter()
            .map(|c| build_passage_text(&c.candidate))
            .collect();

        // Bound concurrent scorer calls; a closed semaphore cannot
        // happen since we never close it
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let raw_scores = match client.score(query, &passages).await {
            Ok(scores) => scores,
            Err(e) => {
                error!(error = %e, "Rerank failed, falling back to composite order");
                return composite_fallback(candidates, top_k);
            }
        };

        let mut reranked: Vec<RerankedCandidate> = candidates
            .into_iter()
            .zip(raw_scores)
            .map(|(scored, raw)| {
                let raw = f64::from(raw);
                let normalized = ((raw + 10.0) / 20.0).clamp(0.0, 1.0);
                let final_score = blend_weight * normalized
                    + (1.0 - blend_weight) * scored.scores.composite_score;
                RerankedCandidate {
                    scored,
                    neural_score: Some(raw),
                    final_score,
                }
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reranked.truncate(top_k);

        info!(returned = reranked.len(), "Reranked candidates");
        reranked
    }
}

/// Skip the stage entirely: final = composite, order unchanged
fn passthrough(candidates: Vec<ScoredCandidate>, top_k: usize) -> Vec<RerankedCandidate> {
    candidates
        .into_iter()
        .take(top_k)
        .map(|scored| {
            let final_score = scored.scores.composite_score;
            RerankedCandidate {
                scored,
                neural_score: None,
                final_score,
            }
        })
        .collect()
}

/// Scorer failed mid-stage: re-sort by composite and truncate
fn composite_fallback(
    mut candidates: Vec<ScoredCandidate>,
    top_k: usize,
) -> Vec<RerankedCandidate> {
    candidates.sort_by(|a, b| {
        b.scores
            .composite_score
            .partial_cmp(&a.scores.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    passthrough(candidates, top_k)
}

/// Passage text for cross-encoder scoring: descriptive fields plus a
/// compact facet suffix
fn build_passage_text(candidate: &RetrievalCandidate) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !candidate.title.is_empty() {
        parts.push(candidate.title.clone());
    }
    if let Some(ref description) = candidate.acoustic_prompt_descriptive {
        parts.push(description.clone());
    }
    if let Some(ref sounds) = candidate.sounds_description {
        parts.push(sounds.clone());
    }

    let mut facets: Vec<String> = Vec::new();
    if let Some(ref genre) = candidate.primary_genre {
        facets.push(format!("Genre: {}", genre));
    }
    if let Some(ref mood) = candidate.primary_mood {
        facets.push(format!("Mood: {}", mood));
    }
    if let Some(bpm) = candidate.bpm {
        facets.push(format!("BPM: {}", bpm));
    }
    if !facets.is_empty() {
        parts.push(facets.join(". "));
    }

    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ranking::ScoreBreakdown;
    use setlist_shared_config::RerankerConfig;
    use setlist_test_utils::MockRerankServer;
    use uuid::Uuid;

    fn scored(title: &str, composite: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: RetrievalCandidate {
                song_id: Uuid::new_v4(),
                output_id: Uuid::new_v4(),
                title: title.to_string(),
                acoustic_prompt_descriptive: Some("dreamy synth pads".to_string()),
                embedding: None,
                bpm: Some(120),
                musical_key: None,
                primary_genre: Some("electronic".to_string()),
                primary_mood: Some("dreamy".to_string()),
                format: None,
                primary_context: None,
                created_at: None,
                output_number: 1,
                audio_url: "https://cdn.example.com/a.mp3".to_string(),
                sounds_description: None,
                click_count: 0,
                impression_count: 0,
                like_count: 0,
                position_sum: 0,
                ctr_estimate: 0.5,
                ctr_variance: 0.25,
                semantic_score: composite,
            },
            scores: ScoreBreakdown {
                semantic_score: composite,
                popularity_score: 0.5,
                exploration_score: 0.5,
                freshness_score: 0.5,
                composite_score: composite,
            },
        }
    }

    fn pool(n: usize) -> Vec<ScoredCandidate> {
        (0..n)
            .map(|i| scored(&format!("song {}", i), 0.9 - i as f64 * 0.01))
            .collect()
    }

    async fn http_reranker(server: &MockRerankServer) -> NeuralReranker {
        let client = RerankClient::new(&RerankerConfig::with_url(server.url()))
            .unwrap()
            .unwrap();
        NeuralReranker::new(RerankerBackend::Http(client), 4)
    }

    #[test]
    fn test_build_passage_text() {
        let candidate = scored("Night Drive", 0.8).candidate;
        let passage = build_passage_text(&candidate);
        assert_eq!(
            passage,
            "Night Drive. dreamy synth pads. Genre: electronic. Mood: dreamy. BPM: 120"
        );
    }

    #[tokio::test]
    async fn test_disabled_backend_passes_through() {
        let reranker = NeuralReranker::new(RerankerBackend::Disabled, 4);
        let results = reranker.rerank("query", pool(12), 5, 0.6).await;

        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            assert!(result.neural_score.is_none());
            assert!(
                (result.final_score - result.scored.scores.composite_score).abs() < f64::EPSILON
            );
            // Order unchanged from the composite ranking
            assert_eq!(result.candidate().title, format!("song {}", i));
        }
    }

    #[tokio::test]
    async fn test_small_pool_skips_reranking() {
        let server = MockRerankServer::start().await;
        server.mock_scores(vec![100.0; 5]).await;
        let reranker = http_reranker(&server).await;

        let results = reranker.rerank("query", pool(5), 10, 0.6).await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.neural_score.is_none()));
    }

    #[tokio::test]
    async fn test_neural_scores_reorder_results() {
        let server = MockRerankServer::start().await;
        // Last passage scores highest
        let mut scores = vec![-5.0_f32; 12];
        scores[11] = 8.0;
        server.mock_scores(scores).await;
        let reranker = http_reranker(&server).await;

        let results = reranker.rerank("query", pool(12), 12, 0.9).await;
        assert_eq!(results[0].candidate().title, "song 11");
        assert!((results[0].neural_score.unwrap() - 8.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_blend_zero_is_composite_identity() {
        let server = MockRerankServer::start().await;
        server.mock_scores(vec![9.0; 12]).await;
        let reranker = http_reranker(&server).await;

        let results = reranker.rerank("query", pool(12), 12, 0.0).await;
        for result in &results {
            assert!(
                (result.final_score - result.scored.scores.composite_score).abs() < 1e-12
            );
        }
    }

    #[tokio::test]
    async fn test_scorer_error_falls_back_to_composite() {
        let server = MockRerankServer::start().await;
        server.mock_failure(500).await;
        let reranker = http_reranker(&server).await;

        let results = reranker.rerank("query", pool(12), 5, 0.6).await;
        assert_eq!(results.len(), 5);
        // Composite order preserved, no neural scores
        assert_eq!(results[0].candidate().title, "song 0");
        assert!(results.iter().all(|r| r.neural_score.is_none()));
    }

    #[tokio::test]
    async fn test_normalization_clamps_extreme_scores() {
        let server = MockRerankServer::start().await;
        // +50 raw normalizes past 1.0 and must clamp: with blend 1.0 the
        // final score equals the clamped normalized value
        let mut scores = vec![-50.0_f32; 12];
        scores[0] = 50.0;
        server.mock_scores(scores).await;
        let reranker = http_reranker(&server).await;

        let results = reranker.rerank("query", pool(12), 12, 1.0).await;
        assert!((results[0].final_score - 1.0).abs() < 1e-12);
        assert!((results.last().unwrap().final_score - 0.0).abs() < 1e-12);
    }
}
