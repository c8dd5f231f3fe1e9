//! Embedding provider client

use std::time::Duration;

use reqwest::Client;
use setlist_shared_config::EmbeddingProviderConfig;
use tracing::debug;

use crate::error::{InferenceError, InferenceResult};
use crate::models::{EmbeddingRequest, EmbeddingResponse};
use crate::retry::{truncate_error_body, RetryPolicy};

/// Client for an OpenAI-compatible embeddings endpoint
///
/// Transient failures (timeouts, 5xx, 429) are retried with exponential
/// backoff; the configured dimension is enforced on every returned
/// vector so a misconfigured provider fails loudly instead of poisoning
/// the vector index.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http_client: Client,
    config: EmbeddingProviderConfig,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    /// Create a new embedding client from configuration
    pub fn new(config: &EmbeddingProviderConfig) -> InferenceResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(InferenceError::HttpError)?;

        Ok(Self {
            http_client,
            config: config.clone(),
            retry: RetryPolicy::default(),
        })
    }

    /// Create a client with a custom HTTP client (for testing)
    pub fn with_client(config: &EmbeddingProviderConfig, http_client: Client) -> Self {
        Self {
            http_client,
            config: config.clone(),
            retry: RetryPolicy::default(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &EmbeddingProviderConfig {
        &self.config
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> InferenceResult<Vec<f32>> {
        let input = vec![text.to_string()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| InferenceError::InvalidResponse("empty data array".to_string()))
    }

    /// Embed a batch of texts, preserving input order
    pub async fn embed_batch(&self, texts: &[String]) -> InferenceResult<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: self.config.model.clone(),
            input: texts.to_vec(),
            dimensions: Some(self.config.dimension),
        };

        let response = self
            .retry
            .run(|| self.post_embeddings(&request))
            .await?;

        if response.data.len() != texts.len() {
            return Err(InferenceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut vectors = vec![Vec::new(); texts.len()];
        for datum in response.data {
            if datum.embedding.len() != self.config.dimension {
                return Err(InferenceError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: datum.embedding.len(),
                });
            }
            if datum.index >= vectors.len() {
                return Err(InferenceError::InvalidResponse(format!(
                    "embedding index {} out of range",
                    datum.index
                )));
            }
            vectors[datum.index] = datum.embedding;
        }

        debug!(count = vectors.len(), model = %self.config.model, "Embedded batch");
        Ok(vectors)
    }

    async fn post_embeddings(
        &self,
        request: &EmbeddingRequest,
    ) -> InferenceResult<EmbeddingResponse> {
        let url = self.config.embeddings_url();

        let mut builder = self.http_client.post(&url).json(request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() {
                InferenceError::ConnectionRefused(self.config.url.clone())
            } else {
                InferenceError::HttpError(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::ServerError {
                status: status.as_u16(),
                body: truncate_error_body(body),
            });
        }

        response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))
    }
}
