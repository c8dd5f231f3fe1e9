//! Service layer: the ranking pipeline stages and the feedback loop
//!
//! Request path: embedding → retrieval → ranking → reranker →
//! diversity. Feedback path: feedback (online) and statistics
//! (offline refresh).

pub mod cache;
pub mod diversity;
pub mod embedding;
pub mod feedback;
pub mod ranking;
pub mod reranker;
pub mod retrieval;
pub mod statistics;

pub use cache::EmbeddingCache;
pub use diversity::{DiversifiedCandidate, DiversityService};
pub use embedding::EmbeddingService;
pub use feedback::{FeedbackService, RecordedInteraction};
pub use ranking::{RankingService, ScoreBreakdown, ScoredCandidate};
pub use reranker::{NeuralReranker, RerankedCandidate, RerankerBackend};
pub use retrieval::{RetrievalCandidate, RetrievalService, SearchFilters};
pub use statistics::{GlobalStats, StatisticsService, TopItem, TopItemsMetric};
