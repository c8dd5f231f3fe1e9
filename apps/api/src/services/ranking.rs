//! Composite scoring: semantic + popularity + exploration + freshness
//!
//! Popularity is the position-debiased CTR, so an item clicked at deep
//! positions is not punished for where it was shown. Exploration gives
//! sparsely-observed items an uncertainty bonus. All four signals live
//! in [0, 1] and combine through configured convex weights.

use chrono::Utc;
use tracing::{info, instrument};

use crate::config::ScoringWeights;
use crate::core::position_bias::PositionBiasCorrector;
use crate::core::thompson::{ExplorationStrategy, ThompsonSampler};
use crate::services::retrieval::RetrievalCandidate;

/// Score components for one candidate
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ScoreBreakdown {
    /// Semantic similarity from retrieval
    pub semantic_score: f64,
    /// Debiased popularity (prior 0.5 without impressions)
    pub popularity_score: f64,
    /// Exploration score
    pub exploration_score: f64,
    /// Freshness decay
    pub freshness_score: f64,
    /// Weighted composite
    pub composite_score: f64,
}

/// A retrieval candidate with its composite score breakdown
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// The underlying retrieval candidate
    pub candidate: RetrievalCandidate,
    /// Score components
    pub scores: ScoreBreakdown,
}

/// Multi-signal ranking service
#[derive(Debug, Clone)]
pub struct RankingService {
    sampler: ThompsonSampler,
    weights: ScoringWeights,
    freshness_decay_rate: f64,
    strategy: ExplorationStrategy,
}

impl RankingService {
    /// Create a ranking service
    pub fn new(
        sampler: ThompsonSampler,
        weights: ScoringWeights,
        freshness_decay_rate: f64,
    ) -> Self {
        Self {
            sampler,
            weights,
            freshness_decay_rate,
            strategy: ExplorationStrategy::Ucb,
        }
    }

    /// Override the exploration strategy
    pub fn with_strategy(mut self, strategy: ExplorationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Score one candidate against the given bias corrector
    pub fn score_candidate(
        &self,
        candidate: &RetrievalCandidate,
        corrector: &PositionBiasCorrector,
    ) -> ScoreBreakdown {
        let semantic_score = candidate.semantic_score;

        let popularity_score = if candidate.impression_count > 0 {
            corrector.simplified_debiased_ctr(
                candidate.click_count,
                candidate.impression_count,
                candidate.position_sum,
            )
        } else {
            0.5
        };

        let exploration_score = self.sampler.exploration_score(
            candidate.click_count,
            candidate.impression_count,
            self.strategy,
        );

        let freshness_score = match candidate.created_at {
            Some(created_at) => {
                let age_days = (Utc::now() - created_at).num_seconds() as f64 / 86_400.0;
                (-self.freshness_decay_rate * age_days.max(0.0)).exp()
            }
            None => 0.5,
        };

        let composite_score = self.weights.semantic * semantic_score
            + self.weights.popularity * popularity_score
            + self.weights.exploration * exploration_score
            + self.weights.freshness * freshness_score;

        ScoreBreakdown {
            semantic_score,
            popularity_score,
            exploration_score,
            freshness_score,
            composite_score,
        }
    }

    /// Rank candidates by composite score, descending
    ///
    /// The sort is stable, so ties keep their retrieval order. The
    /// corrector is passed per call because its propensity table may
    /// have been recalibrated since the last request.
    #[instrument(skip(self, candidates, corrector), fields(count = candidates.len()))]
    pub fn rank(
        &self,
        candidates: Vec<RetrievalCandidate>,
        corrector: &PositionBiasCorrector,
        limit: usize,
    ) -> Vec<ScoredCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let scores = self.score_candidate(&candidate, corrector);
                ScoredCandidate { candidate, scores }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.scores
                .composite_score
                .partial_cmp(&a.scores.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        info!(returned = scored.len(), "Ranked candidates");
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn candidate(semantic: f64, clicks: i64, impressions: i64, position_sum: i64) -> RetrievalCandidate {
        RetrievalCandidate {
            song_id: Uuid::new_v4(),
            output_id: Uuid::new_v4(),
            title: "test song".to_string(),
            acoustic_prompt_descriptive: None,
            embedding: None,
            bpm: None,
            musical_key: None,
            primary_genre: None,
            primary_mood: None,
            format: None,
            primary_context: None,
            created_at: Some(Utc::now()),
            output_number: 1,
            audio_url: "https://cdn.example.com/a.mp3".to_string(),
            sounds_description: None,
            click_count: clicks,
            impression_count: impressions,
            like_count: 0,
            position_sum,
            ctr_estimate: 0.5,
            ctr_variance: 0.25,
            semantic_score: semantic,
        }
    }

    fn service() -> RankingService {
        RankingService::new(ThompsonSampler::default(), ScoringWeights::default(), 0.01)
    }

    #[test]
    fn test_popularity_prior_without_impressions() {
        let scores = service().score_candidate(
            &candidate(0.8, 0, 0, 0),
            &PositionBiasCorrector::default(),
        );
        assert!((scores.popularity_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_debiased_popularity_with_impressions() {
        // 10 clicks / 100 impressions at average position 2
        let scores = service().score_candidate(
            &candidate(0.8, 10, 100, 200),
            &PositionBiasCorrector::default(),
        );
        assert!((scores.popularity_score - 0.10 / 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_fresh_item_has_high_freshness() {
        let scores = service().score_candidate(
            &candidate(0.5, 0, 0, 0),
            &PositionBiasCorrector::default(),
        );
        assert!(scores.freshness_score > 0.999);
    }

    #[test]
    fn test_missing_timestamp_freshness_prior() {
        let mut c = candidate(0.5, 0, 0, 0);
        c.created_at = None;
        let scores = service().score_candidate(&c, &PositionBiasCorrector::default());
        assert!((scores.freshness_score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_composite_is_weighted_sum() {
        let weights = ScoringWeights::default();
        let scores = service().score_candidate(
            &candidate(0.8, 10, 100, 200),
            &PositionBiasCorrector::default(),
        );
        let expected = weights.semantic * scores.semantic_score
            + weights.popularity * scores.popularity_score
            + weights.exploration * scores.exploration_score
            + weights.freshness * scores.freshness_score;
        assert!((scores.composite_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_cold_pool_ordered_by_semantic() {
        // With zero stats everywhere, popularity and exploration are
        // constants and freshness is shared, so semantic decides
        let pool = vec![
            candidate(0.3, 0, 0, 0),
            candidate(0.9, 0, 0, 0),
            candidate(0.6, 0, 0, 0),
        ];
        let ranked = service().rank(pool, &PositionBiasCorrector::default(), 10);
        assert!((ranked[0].scores.semantic_score - 0.9).abs() < f64::EPSILON);
        assert!((ranked[1].scores.semantic_score - 0.6).abs() < f64::EPSILON);
        assert!((ranked[2].scores.semantic_score - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let a = candidate(0.5, 0, 0, 0);
        let b = candidate(0.5, 0, 0, 0);
        let first_id = a.output_id;
        let mut pool = vec![a, b];
        // Identical inputs tie exactly; stable sort keeps input order
        pool[1].created_at = pool[0].created_at;
        let ranked = service().rank(pool, &PositionBiasCorrector::default(), 10);
        assert_eq!(ranked[0].candidate.output_id, first_id);
    }

    #[test]
    fn test_rank_truncates_to_limit() {
        let pool: Vec<_> = (0..10).map(|i| candidate(i as f64 / 10.0, 0, 0, 0)).collect();
        let ranked = service().rank(pool, &PositionBiasCorrector::default(), 3);
        assert_eq!(ranked.len(), 3);
    }
}
