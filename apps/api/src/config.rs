//! API server configuration

use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use setlist_shared_config::{
    parse_env, CommonConfig, DatabaseConfig, EmbeddingProviderConfig, Environment, RedisConfig,
    RerankerConfig,
};

use crate::core::position_bias::DEFAULT_PROPENSITIES;

/// Relative weights of the composite score components
///
/// Must sum to 1.0; enforced when the configuration is loaded.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    /// Weight of semantic similarity
    pub semantic: f64,
    /// Weight of debiased popularity
    pub popularity: f64,
    /// Weight of the exploration score
    pub exploration: f64,
    /// Weight of freshness decay
    pub freshness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            semantic: 0.50,
            popularity: 0.25,
            exploration: 0.15,
            freshness: 0.10,
        }
    }
}

impl ScoringWeights {
    /// Sum of all weights
    pub fn sum(&self) -> f64 {
        self.semantic + self.popularity + self.exploration + self.freshness
    }

    /// Validate that the weights form a convex combination
    pub fn validate(&self) -> Result<()> {
        let sum = self.sum();
        anyhow::ensure!(
            (sum - 1.0).abs() <= 1e-6,
            "scoring weights must sum to 1.0, got {}",
            sum
        );
        Ok(())
    }
}

/// Pipeline stage pool sizes
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// HNSW ef_search parameter for the ANN traversal
    pub hnsw_ef_search: u32,
    /// Candidates fetched from the vector index
    pub candidate_pool_size: i64,
    /// Candidates surviving composite ranking
    pub ranking_pool_size: usize,
    /// Candidates surviving neural reranking
    pub rerank_pool_size: usize,
    /// Final result list size
    pub final_result_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            hnsw_ef_search: 100,
            candidate_pool_size: 500,
            ranking_pool_size: 50,
            rerank_pool_size: 30,
            final_result_size: 20,
        }
    }
}

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with the worker
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// Pipeline stage pool sizes
    pub search: SearchConfig,

    /// Composite score weights
    pub weights: ScoringWeights,

    /// Enable the neural reranking stage
    pub enable_neural_rerank: bool,

    /// Blend weight of the neural score vs the composite score
    pub rerank_blend_weight: f64,

    /// Thompson sampling prior alpha
    pub thompson_prior_alpha: f64,

    /// Thompson sampling prior beta
    pub thompson_prior_beta: f64,

    /// Position propensity table (falls back to the built-in table)
    pub position_propensities: HashMap<u32, f64>,

    /// Propensity floor for positions absent from the table
    pub default_propensity: f64,

    /// Freshness decay rate per day
    pub freshness_decay_rate: f64,

    /// MMR relevance weight λ
    pub mmr_lambda: f64,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Fails when scoring weights do not sum to 1.0: a silently
    /// renormalized weight table is harder to debug than a refused
    /// boot.
    pub fn from_env() -> Result<Self> {
        let common =
            CommonConfig::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        let weights = ScoringWeights {
            semantic: parse_env("WEIGHT_SEMANTIC", 0.50)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            popularity: parse_env("WEIGHT_POPULARITY", 0.25)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            exploration: parse_env("WEIGHT_EXPLORATION", 0.15)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            freshness: parse_env("WEIGHT_FRESHNESS", 0.10)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
        };
        weights.validate()?;

        let position_propensities = match env::var("POSITION_PROPENSITIES") {
            Ok(raw) => parse_propensity_table(&raw).context("Invalid POSITION_PROPENSITIES")?,
            Err(_) => DEFAULT_PROPENSITIES.iter().copied().collect(),
        };

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT value")?,

            search: SearchConfig {
                hnsw_ef_search: parse_env("HNSW_EF_SEARCH", 100)
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                candidate_pool_size: parse_env("CANDIDATE_POOL_SIZE", 500)
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                ranking_pool_size: parse_env("RANKING_POOL_SIZE", 50)
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                rerank_pool_size: parse_env("RERANK_POOL_SIZE", 30)
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
                final_result_size: parse_env("FINAL_RESULT_SIZE", 20)
                    .map_err(|e| anyhow::anyhow!("{}", e))?,
            },

            weights,

            enable_neural_rerank: parse_env("ENABLE_NEURAL_RERANK", true)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            rerank_blend_weight: parse_env("RERANK_BLEND_WEIGHT", 0.6)
                .map_err(|e| anyhow::anyhow!("{}", e))?,

            thompson_prior_alpha: parse_env("THOMPSON_PRIOR_ALPHA", 1.0)
                .map_err(|e| anyhow::anyhow!("{}", e))?,
            thompson_prior_beta: parse_env("THOMPSON_PRIOR_BETA", 1.0)
                .map_err(|e| anyhow::anyhow!("{}", e))?,

            position_propensities,
            default_propensity: parse_env("DEFAULT_PROPENSITY", 0.05)
                .map_err(|e| anyhow::anyhow!("{}", e))?,

            freshness_decay_rate: parse_env("FRESHNESS_DECAY_RATE", 0.01)
                .map_err(|e| anyhow::anyhow!("{}", e))?,

            mmr_lambda: parse_env("MMR_LAMBDA", 0.7).map_err(|e| anyhow::anyhow!("{}", e))?,

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }

    // Convenience accessors for common config fields

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get Redis configuration
    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    /// Get embedding provider configuration
    pub fn embedding(&self) -> &EmbeddingProviderConfig {
        &self.common.inference.embedding
    }

    /// Get reranker configuration
    pub fn reranker(&self) -> &RerankerConfig {
        &self.common.inference.reranker
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}

/// Parse a JSON propensity table, e.g. `{"1": 1.0, "2": 0.7}`
fn parse_propensity_table(raw: &str) -> Result<HashMap<u32, f64>> {
    let parsed: HashMap<String, f64> = serde_json::from_str(raw)?;
    parsed
        .into_iter()
        .map(|(position, propensity)| {
            let position: u32 = position
                .parse()
                .with_context(|| format!("invalid position key '{}'", position))?;
            anyhow::ensure!(
                propensity > 0.0 && propensity <= 1.0,
                "propensity at position {} out of (0, 1]: {}",
                position,
                propensity
            );
            Ok((position, propensity))
        })
        .collect()
}
