//! MMR diversity stage
//!
//! Wraps the core MMR selector: picks the song embedding and final
//! score off each reranked candidate, computes a genre quota map from
//! the pool, and merges the selection scores back onto the survivors.

use std::collections::HashMap;

use tracing::{debug, info, instrument};

use crate::core::mmr::{allocate_genre_slots, MmrCandidate, MmrDiversifier, MmrResult};
use crate::services::reranker::RerankedCandidate;

/// Minimum guaranteed slots for each genre observed in the pool
const MIN_SLOTS_PER_GENRE: usize = 2;

/// A candidate surviving diversification
#[derive(Debug, Clone)]
pub struct DiversifiedCandidate {
    /// The reranked candidate
    pub reranked: RerankedCandidate,
    /// MMR score at selection time (None when MMR was skipped)
    pub mmr_score: Option<f64>,
    /// 1-based MMR rank (None when MMR was skipped)
    pub mmr_rank: Option<usize>,
    /// Redundancy to the previously selected set
    pub redundancy_score: Option<f64>,
}

/// MMR diversity service
#[derive(Debug, Clone)]
pub struct DiversityService {
    diversifier: MmrDiversifier,
}

impl DiversityService {
    /// Create a diversity service with the given relevance weight λ
    pub fn new(mmr_lambda: f64) -> Self {
        Self {
            diversifier: MmrDiversifier::new(mmr_lambda),
        }
    }

    /// Diversify the pool down to `k` results
    ///
    /// Pools of size ≤ k pass through untouched. Candidates without an
    /// embedding cannot participate in redundancy computation and are
    /// excluded from selection.
    #[instrument(skip(self, candidates), fields(count = candidates.len(), k))]
    pub fn diversify(
        &self,
        candidates: Vec<RerankedCandidate>,
        k: usize,
        use_genre_slots: bool,
    ) -> Vec<DiversifiedCandidate> {
        if candidates.is_empty() {
            return Vec::new();
        }

        if candidates.len() <= k {
            return candidates
                .into_iter()
                .map(|reranked| DiversifiedCandidate {
                    reranked,
                    mmr_score: None,
                    mmr_rank: None,
                    redundancy_score: None,
                })
                .collect();
        }

        let genre_slots = if use_genre_slots {
            let slots = allocate_genre_slots(
                candidates
                    .iter()
                    .map(|c| c.candidate().primary_genre.as_deref()),
                k,
                MIN_SLOTS_PER_GENRE,
            );
            debug!(?slots, "Allocated genre slots");
            Some(slots)
        } else {
            None
        };

        let mmr_candidates: Vec<MmrCandidate> = candidates
            .iter()
            .filter_map(|c| {
                let embedding = c.candidate().embedding.as_ref()?;
                Some(MmrCandidate {
                    id: c.candidate().output_id,
                    relevance: c.final_score,
                    embedding: embedding.as_slice().to_vec(),
                    primary_genre: c.candidate().primary_genre.clone(),
                })
            })
            .collect();

        let selected: HashMap<uuid::Uuid, MmrResult> = self
            .diversifier
            .diversify(mmr_candidates, k, genre_slots.as_ref())
            .into_iter()
            .map(|result| (result.id, result))
            .collect();

        let mut output: Vec<DiversifiedCandidate> = candidates
            .into_iter()
            .filter_map(|reranked| {
                let result = selected.get(&reranked.candidate().output_id)?;
                Some(DiversifiedCandidate {
                    mmr_score: Some(result.mmr_score),
                    mmr_rank: Some(result.rank),
                    redundancy_score: Some(result.redundancy),
                    reranked,
                })
            })
            .collect();

        output.sort_by_key(|c| c.mmr_rank.unwrap_or(usize::MAX));

        info!(returned = output.len(), "Diversified results");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ranking::{ScoreBreakdown, ScoredCandidate};
    use crate::services::retrieval::RetrievalCandidate;
    use pgvector::Vector;
    use uuid::Uuid;

    fn reranked(
        final_score: f64,
        axis: usize,
        genre: Option<&str>,
        with_embedding: bool,
    ) -> RerankedCandidate {
        let mut embedding = vec![0.0_f32; 8];
        embedding[axis % 8] = 1.0;
        RerankedCandidate {
            scored: ScoredCandidate {
                candidate: RetrievalCandidate {
                    song_id: Uuid::new_v4(),
                    output_id: Uuid::new_v4(),
                    title: format!("song {}", axis),
                    acoustic_prompt_descriptive: None,
                    embedding: with_embedding.then(|| Vector::from(embedding)),
                    bpm: None,
                    musical_key: None,
                    primary_genre: genre.map(str::to_string),
                    primary_mood: None,
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
                    semantic_score: final_score,
                },
                scores: ScoreBreakdown {
                    semantic_score: final_score,
                    popularity_score: 0.5,
                    exploration_score: 0.5,
                    freshness_score: 0.5,
                    composite_score: final_score,
                },
            },
            neural_score: None,
            final_score,
        }
    }

    #[test]
    fn test_small_pool_passes_through() {
        let pool = vec![
            reranked(0.9, 0, None, true),
            reranked(0.8, 1, None, true),
        ];
        let ids: Vec<Uuid> = pool.iter().map(|c| c.candidate().output_id).collect();

        let results = DiversityService::new(0.7).diversify(pool, 20, true);

        assert_eq!(results.len(), 2);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.reranked.candidate().output_id, ids[i]);
            assert!(result.mmr_rank.is_none());
        }
    }

    #[test]
    fn test_diversify_selects_k_and_orders_by_rank() {
        let pool: Vec<_> = (0..8)
            .map(|i| reranked(0.9 - i as f64 * 0.05, i, None, true))
            .collect();

        let results = DiversityService::new(0.7).diversify(pool, 3, false);

        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.mmr_rank.unwrap()).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(results.iter().all(|r| r.mmr_score.is_some()));
    }

    #[test]
    fn test_embedding_less_candidates_excluded() {
        let mut pool: Vec<_> = (0..6)
            .map(|i| reranked(0.5, i, None, true))
            .collect();
        // Highest relevance but no embedding: cannot be selected
        pool.push(reranked(0.99, 6, None, false));
        let missing_id = pool.last().unwrap().candidate().output_id;

        let results = DiversityService::new(0.7).diversify(pool, 4, false);

        assert_eq!(results.len(), 4);
        assert!(results
            .iter()
            .all(|r| r.reranked.candidate().output_id != missing_id));
    }

    #[test]
    fn test_genre_slots_limit_dominant_genre() {
        let mut pool = Vec::new();
        for i in 0..20 {
            pool.push(reranked(0.95 - i as f64 * 0.001, i, Some("pop"), true));
        }
        for i in 20..26 {
            pool.push(reranked(0.5, i, Some("jazz"), true));
        }
        for i in 26..30 {
            pool.push(reranked(0.4, i, Some("folk"), true));
        }

        let results = DiversityService::new(0.7).diversify(pool, 10, true);

        let pop = results
            .iter()
            .filter(|r| r.reranked.candidate().primary_genre.as_deref() == Some("pop"))
            .count();
        assert!(pop < 10);
        assert!(results
            .iter()
            .any(|r| r.reranked.candidate().primary_genre.as_deref() == Some("jazz")));
    }
}
