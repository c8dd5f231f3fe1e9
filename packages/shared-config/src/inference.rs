//! Embedding provider and reranker configuration types

use crate::{get_env_or_default, parse_env, ConfigResult};

/// External embedding provider configuration
///
/// The provider speaks the OpenAI-compatible `/v1/embeddings` contract.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    /// Provider base URL
    pub url: String,

    /// API key, sent as a bearer token when present
    pub api_key: Option<String>,

    /// Embedding model name
    pub model: String,

    /// Embedding vector dimension
    pub dimension: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl EmbeddingProviderConfig {
    /// Load embedding provider configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: get_env_or_default("EMBEDDING_PROVIDER_URL", "https://api.openai.com"),
            api_key: std::env::var("EMBEDDING_API_KEY").ok().filter(|s| !s.is_empty()),
            model: get_env_or_default("EMBEDDING_MODEL", "text-embedding-3-small"),
            dimension: parse_env("EMBEDDING_DIMENSION", 1536)?,
            timeout_secs: parse_env("EMBEDDING_TIMEOUT", 30)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Get the full URL for the embeddings endpoint
    pub fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.url.trim_end_matches('/'))
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout_secs: 30,
        }
    }
}

/// Cross-encoder reranker endpoint configuration
///
/// The scorer speaks the text-embeddings-inference `/rerank` contract:
/// `{query, texts}` in, `[{index, score}]` out. When no URL is
/// configured the reranking stage degrades to composite-score ordering.
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Reranker base URL (None disables neural reranking)
    pub url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum concurrent rerank calls in flight
    pub max_concurrency: usize,
}

impl RerankerConfig {
    /// Load reranker configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: std::env::var("RERANKER_URL").ok().filter(|s| !s.is_empty()),
            timeout_secs: parse_env("RERANKER_TIMEOUT", 10)?,
            max_concurrency: parse_env("RERANKER_MAX_CONCURRENCY", 4)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            timeout_secs: 10,
            max_concurrency: 4,
        }
    }

    /// Get the full URL for the rerank endpoint, if configured
    pub fn rerank_url(&self) -> Option<String> {
        self.url
            .as_ref()
            .map(|u| format!("{}/rerank", u.trim_end_matches('/')))
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            max_concurrency: 4,
        }
    }
}

/// Combined inference configuration (embedding provider + reranker)
#[derive(Debug, Clone, Default)]
pub struct InferenceConfig {
    /// Embedding provider configuration
    pub embedding: EmbeddingProviderConfig,

    /// Reranker configuration
    pub reranker: RerankerConfig,
}

impl InferenceConfig {
    /// Load inference configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            embedding: EmbeddingProviderConfig::from_env()?,
            reranker: RerankerConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_embedding_config() {
        let config = EmbeddingProviderConfig::default();
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimension, 1536);
    }

    #[test]
    fn test_embeddings_url() {
        let config = EmbeddingProviderConfig::with_url("http://localhost:8089/");
        assert_eq!(config.embeddings_url(), "http://localhost:8089/v1/embeddings");
    }

    #[test]
    fn test_reranker_disabled_by_default() {
        let config = RerankerConfig::default();
        assert!(config.url.is_none());
        assert!(config.rerank_url().is_none());
    }

    #[test]
    fn test_rerank_url() {
        let config = RerankerConfig::with_url("http://localhost:8090");
        assert_eq!(config.rerank_url().unwrap(), "http://localhost:8090/rerank");
    }
}
