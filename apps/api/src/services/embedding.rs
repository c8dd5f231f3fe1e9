//! Query embedding service
//!
//! Cache-through wrapper over the external embedding provider. Empty
//! queries embed to the zero vector without touching the provider; a
//! provider failure after the client's retries surfaces as a
//! retrieval-stage error.

use setlist_inference_client::EmbeddingClient;
use tracing::{debug, instrument};

use crate::error::{ApiError, ApiResult};
use crate::services::cache::EmbeddingCache;

/// Query embedding service
#[derive(Clone)]
pub struct EmbeddingService {
    client: EmbeddingClient,
    cache: EmbeddingCache,
    dimension: usize,
}

impl EmbeddingService {
    /// Create an embedding service over a provider client and cache
    pub fn new(client: EmbeddingClient, cache: EmbeddingCache) -> Self {
        let dimension = client.config().dimension;
        Self {
            client,
            cache,
            dimension,
        }
    }

    /// Embedding dimension this service produces
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a search query
    ///
    /// # Errors
    /// - `ApiError::Embedding` - provider unreachable after retries
    #[instrument(skip(self), fields(query_len = query.len()))]
    pub async fn embed_query(&self, query: &str) -> ApiResult<Vec<f32>> {
        let normalized = query.trim();
        if normalized.is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        if let Some(cached) = self.cache.get(normalized).await {
            return Ok(cached);
        }

        debug!("Embedding cache miss, calling provider");
        let embedding = self
            .client
            .embed(normalized)
            .await
            .map_err(|e| ApiError::Embedding(e.to_string()))?;

        self.cache.set(normalized, &embedding).await;
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use setlist_shared_config::{EmbeddingProviderConfig, RedisConfig};
    use setlist_test_utils::MockEmbeddingServer;

    async fn service(server: &MockEmbeddingServer, dimension: usize) -> EmbeddingService {
        let mut provider = EmbeddingProviderConfig::with_url(server.url());
        provider.dimension = dimension;
        let client = EmbeddingClient::new(&provider).unwrap();
        // Point the cache at a closed port so it degrades to bypass
        let cache = EmbeddingCache::new(
            RedisConfig::with_url("redis://127.0.0.1:1"),
            provider.model.clone(),
            dimension,
        );
        EmbeddingService::new(client, cache)
    }

    #[tokio::test]
    async fn test_empty_query_yields_zero_vector() {
        let server = MockEmbeddingServer::start().await;
        let service = service(&server, 4).await;

        let embedding = service.embed_query("   ").await.unwrap();
        assert_eq!(embedding, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn test_embeds_through_provider_when_cache_down() {
        let server = MockEmbeddingServer::start().await;
        server.mock_with_value(vec![0.5, 0.5, 0.0, 0.0]).await;
        let service = service(&server, 4).await;

        let embedding = service.embed_query("upbeat pop").await.unwrap();
        assert_eq!(embedding, vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_as_embedding_error() {
        let server = MockEmbeddingServer::start().await;
        server.mock_failure(401, "invalid api key").await;
        let service = service(&server, 4).await;

        let result = service.embed_query("upbeat pop").await;
        assert!(matches!(result, Err(ApiError::Embedding(_))));
    }
}
