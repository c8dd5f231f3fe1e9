//! Maximal Marginal Relevance (MMR) diversification
//!
//! Greedy selection that trades relevance against redundancy with the
//! already-selected set, with optional per-genre slot quotas so one
//! dominant genre cannot monopolize the final page.

use std::collections::HashMap;

use uuid::Uuid;

/// Genre bucket used when a candidate has no primary genre
pub const UNKNOWN_GENRE: &str = "other";

/// Pairwise similarity used for redundancy; cosine by default
pub type SimilarityFn = fn(&[f32], &[f32]) -> f64;

/// Cosine similarity between two vectors; 0.0 when either is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// One item entering MMR selection
#[derive(Debug, Clone)]
pub struct MmrCandidate {
    /// Audio output identifier
    pub id: Uuid,
    /// Relevance in [0, 1] (final or composite score upstream)
    pub relevance: f64,
    /// Song embedding
    pub embedding: Vec<f32>,
    /// Primary genre for quota accounting
    pub primary_genre: Option<String>,
}

impl MmrCandidate {
    fn genre(&self) -> &str {
        self.primary_genre.as_deref().unwrap_or(UNKNOWN_GENRE)
    }
}

/// One selected item with its selection-time scores
#[derive(Debug, Clone, PartialEq)]
pub struct MmrResult {
    /// Audio output identifier
    pub id: Uuid,
    /// Relevance carried from the candidate
    pub relevance: f64,
    /// λ·relevance − (1−λ)·redundancy at selection time
    pub mmr_score: f64,
    /// Max similarity to the previously selected set
    pub redundancy: f64,
    /// 1-based selection rank
    pub rank: usize,
}

/// Greedy MMR diversifier
#[derive(Debug, Clone)]
pub struct MmrDiversifier {
    lambda_relevance: f64,
    similarity: SimilarityFn,
}

impl Default for MmrDiversifier {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl MmrDiversifier {
    /// Create a diversifier with the given relevance weight λ ∈ [0, 1]
    pub fn new(lambda_relevance: f64) -> Self {
        Self {
            lambda_relevance,
            similarity: cosine_similarity,
        }
    }

    /// Substitute the similarity function (tests, alternative metrics)
    pub fn with_similarity(mut self, similarity: SimilarityFn) -> Self {
        self.similarity = similarity;
        self
    }

    /// Max similarity of `candidate` to anything already selected
    fn redundancy(&self, candidate: &MmrCandidate, selected: &[MmrCandidate]) -> f64 {
        selected
            .iter()
            .map(|s| (self.similarity)(&candidate.embedding, &s.embedding))
            .fold(0.0_f64, f64::max)
    }

    fn mmr_score(&self, relevance: f64, redundancy: f64) -> f64 {
        self.lambda_relevance * relevance - (1.0 - self.lambda_relevance) * redundancy
    }

    /// Select up to `k` diverse items
    ///
    /// `genre_slots` is advisory: candidates whose genre quota is full
    /// are skipped, and when no candidate is eligible selection stops
    /// early so the shortfall is absorbed by whatever was already
    /// chosen. Ties break toward earlier input order.
    pub fn diversify(
        &self,
        candidates: Vec<MmrCandidate>,
        k: usize,
        genre_slots: Option<&HashMap<String, usize>>,
    ) -> Vec<MmrResult> {
        if candidates.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut remaining = candidates;
        let mut selected: Vec<MmrCandidate> = Vec::new();
        let mut results: Vec<MmrResult> = Vec::new();
        let mut genre_counts: HashMap<String, usize> = genre_slots
            .map(|slots| slots.keys().map(|g| (g.clone(), 0)).collect())
            .unwrap_or_default();

        while results.len() < k && !remaining.is_empty() {
            let mut best: Option<(usize, f64, f64)> = None;

            for (index, candidate) in remaining.iter().enumerate() {
                if let Some(slots) = genre_slots {
                    let genre = candidate.genre();
                    if let (Some(&used), Some(&quota)) =
                        (genre_counts.get(genre), slots.get(genre))
                    {
                        if used >= quota {
                            continue;
                        }
                    }
                }

                let redundancy = self.redundancy(candidate, &selected);
                let score = self.mmr_score(candidate.relevance, redundancy);

                if best.map_or(true, |(_, best_score, _)| score > best_score) {
                    best = Some((index, score, redundancy));
                }
            }

            // All quotas exhausted
            let Some((index, score, redundancy)) = best else {
                break;
            };

            let chosen = remaining.remove(index);
            if genre_slots.is_some() {
                if let Some(count) = genre_counts.get_mut(chosen.genre()) {
                    *count += 1;
                }
            }

            results.push(MmrResult {
                id: chosen.id,
                relevance: chosen.relevance,
                mmr_score: score,
                redundancy,
                rank: results.len() + 1,
            });
            selected.push(chosen);
        }

        results
    }
}

/// Allocate result slots per genre from the candidate distribution
///
/// Every observed genre is first guaranteed `min_per_genre` slots
/// (truncated by what remains), then leftover slots are distributed
/// proportionally to genre frequency, most common first. The resulting
/// map may allocate fewer than `total_slots`; MMR's early-stop rule
/// absorbs the remainder.
pub fn allocate_genre_slots<'a, I>(
    genres: I,
    total_slots: usize,
    min_per_genre: usize,
) -> HashMap<String, usize>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for genre in genres {
        *counts
            .entry(genre.unwrap_or(UNKNOWN_GENRE).to_string())
            .or_insert(0) += 1;
    }

    let total_items: usize = counts.values().sum();
    if total_items == 0 {
        return HashMap::new();
    }

    // Most common first, names break ties for determinism
    let mut ordered: Vec<(&String, &usize)> = counts.iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut remaining = total_slots;

    for (genre, _) in &ordered {
        if remaining == 0 {
            break;
        }
        let allocated = min_per_genre.min(remaining);
        slots.insert((*genre).clone(), allocated);
        remaining -= allocated;
    }

    if remaining > 0 {
        for (genre, &count) in &ordered {
            let proportion = count as f64 / total_items as f64;
            let bonus = (remaining as f64 * proportion) as usize;
            *slots.entry((*genre).clone()).or_insert(0) += bonus;
            remaining -= bonus.min(remaining);
            if remaining == 0 {
                break;
            }
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis_candidate(axis: usize, relevance: f64, genre: Option<&str>) -> MmrCandidate {
        let mut embedding = vec![0.0_f32; 16];
        embedding[axis % 16] = 1.0;
        MmrCandidate {
            id: Uuid::new_v4(),
            relevance,
            embedding,
            primary_genre: genre.map(str::to_string),
        }
    }

    #[test]
    fn test_cosine_similarity_basics() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let zero = vec![0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
        assert!(cosine_similarity(&a, &zero).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_candidates() {
        let diversifier = MmrDiversifier::default();
        assert!(diversifier.diversify(Vec::new(), 10, None).is_empty());
    }

    #[test]
    fn test_lambda_one_equals_relevance_ordering() {
        // Distinct embeddings, relevances 0.9 > 0.8 > 0.7
        let candidates = vec![
            axis_candidate(0, 0.9, None),
            axis_candidate(1, 0.8, None),
            axis_candidate(2, 0.7, None),
        ];
        let ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();

        let results = MmrDiversifier::new(1.0).diversify(candidates, 3, None);

        assert_eq!(results.len(), 3);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.id, ids[i]);
            assert_eq!(result.rank, i + 1);
            // With λ=1 the redundancy term vanishes from the score
            assert!((result.mmr_score - result.relevance).abs() < 1e-12);
            assert!(result.redundancy <= 1.0);
        }
    }

    #[test]
    fn test_lambda_zero_picks_least_similar() {
        // First pick is highest relevance; afterwards only dissimilarity
        // matters. Candidate 1 duplicates candidate 0's embedding.
        let mut duplicate = axis_candidate(0, 0.85, None);
        duplicate.id = Uuid::new_v4();
        let candidates = vec![
            axis_candidate(0, 0.9, None),
            duplicate.clone(),
            axis_candidate(3, 0.1, None),
        ];
        let distinct_id = candidates[2].id;

        let results = MmrDiversifier::new(0.0).diversify(candidates, 2, None);

        assert_eq!(results.len(), 2);
        // Second pick avoids the duplicate embedding despite its higher
        // relevance
        assert_eq!(results[1].id, distinct_id);
        assert!(results[1].redundancy.abs() < 1e-9);
    }

    #[test]
    fn test_ties_break_by_input_order() {
        let candidates = vec![
            axis_candidate(0, 0.5, None),
            axis_candidate(1, 0.5, None),
        ];
        let first_id = candidates[0].id;
        let results = MmrDiversifier::new(1.0).diversify(candidates, 1, None);
        assert_eq!(results[0].id, first_id);
    }

    #[test]
    fn test_genre_quota_never_exceeded() {
        let mut candidates = Vec::new();
        for i in 0..10 {
            candidates.push(axis_candidate(i, 0.9 - i as f64 * 0.01, Some("pop")));
        }
        for i in 10..14 {
            candidates.push(axis_candidate(i, 0.5 - i as f64 * 0.01, Some("jazz")));
        }

        let slots: HashMap<String, usize> =
            [("pop".to_string(), 3), ("jazz".to_string(), 2)].into_iter().collect();
        let results = MmrDiversifier::default().diversify(candidates.clone(), 10, Some(&slots));

        let genre_of = |id: Uuid| -> String {
            candidates
                .iter()
                .find(|c| c.id == id)
                .and_then(|c| c.primary_genre.clone())
                .unwrap()
        };
        let pop = results.iter().filter(|r| genre_of(r.id) == "pop").count();
        let jazz = results.iter().filter(|r| genre_of(r.id) == "jazz").count();

        assert!(pop <= 3);
        assert!(jazz <= 2);
        // Quotas exhausted before k: early stop
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_diversity_bound_with_dominant_genre() {
        // 70% of the pool is one genre; the top 20 must not be
        let mut candidates = Vec::new();
        for i in 0..70 {
            candidates.push(axis_candidate(i, 0.99 - i as f64 * 0.001, Some("edm")));
        }
        for i in 70..90 {
            candidates.push(axis_candidate(i, 0.99 - i as f64 * 0.001, Some("folk")));
        }
        for i in 90..100 {
            candidates.push(axis_candidate(i, 0.99 - i as f64 * 0.001, Some("ambient")));
        }

        let slots = allocate_genre_slots(
            candidates.iter().map(|c| c.primary_genre.as_deref()),
            20,
            2,
        );
        let results = MmrDiversifier::default().diversify(candidates.clone(), 20, Some(&slots));

        let count_genre = |genre: &str| {
            results
                .iter()
                .filter(|r| {
                    candidates
                        .iter()
                        .find(|c| c.id == r.id)
                        .map(|c| c.primary_genre.as_deref() == Some(genre))
                        .unwrap_or(false)
                })
                .count()
        };

        assert!(count_genre("edm") < 20);
        assert!(count_genre("folk") >= 1);
        assert!(count_genre("ambient") >= 1);
    }

    #[test]
    fn test_allocate_slots_min_guarantee_and_proportional_bonus() {
        // 70/20/10 over 20 slots: mins 2+2+2, bonuses floor(14*.7)=9,
        // floor(5*.2)=1, floor(4*.1)=0
        let genres: Vec<Option<&str>> = std::iter::repeat(Some("edm"))
            .take(70)
            .chain(std::iter::repeat(Some("folk")).take(20))
            .chain(std::iter::repeat(Some("ambient")).take(10))
            .collect();

        let slots = allocate_genre_slots(genres, 20, 2);
        assert_eq!(slots["edm"], 11);
        assert_eq!(slots["folk"], 3);
        assert_eq!(slots["ambient"], 2);
    }

    #[test]
    fn test_allocate_slots_truncated_by_total() {
        let genres: Vec<Option<&str>> = vec![
            Some("a"), Some("a"), Some("b"), Some("b"), Some("c"), Some("c"),
        ];
        // Only 3 slots for 3 genres needing 2 each
        let slots = allocate_genre_slots(genres, 3, 2);
        let total: usize = slots.values().sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_allocate_slots_missing_genre_buckets_as_other() {
        let slots = allocate_genre_slots(vec![None, None, Some("pop")], 10, 2);
        assert!(slots.contains_key(UNKNOWN_GENRE));
        assert!(slots.contains_key("pop"));
    }

    #[test]
    fn test_allocate_slots_empty_input() {
        let slots = allocate_genre_slots(Vec::<Option<&str>>::new(), 20, 2);
        assert!(slots.is_empty());
    }
}
