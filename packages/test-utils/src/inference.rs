//! Mock inference servers for testing
//!
//! Wrappers around [`wiremock::MockServer`] that simulate the embedding
//! provider and the cross-encoder rerank endpoint.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock OpenAI-compatible embedding server
///
/// # Example
///
/// ```rust,ignore
/// use setlist_test_utils::MockEmbeddingServer;
///
/// #[tokio::test]
/// async fn test_embeddings() {
///     let server = MockEmbeddingServer::start().await;
///     server.mock_success(4).await;
///     // Point EMBEDDING_PROVIDER_URL at server.url()
/// }
/// ```
pub struct MockEmbeddingServer {
    server: MockServer,
}

impl MockEmbeddingServer {
    /// Start a new mock embedding server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Mount a mock returning a fixed ramp embedding of the given dimension
    pub async fn mock_success(&self, dimension: usize) {
        let embedding: Vec<f32> = (0..dimension).map(|i| (i as f32 * 0.001) % 1.0).collect();
        self.mock_with_value(embedding).await;
    }

    /// Mount a mock returning a specific embedding for every request
    pub async fn mock_with_value(&self, embedding: Vec<f32>) {
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": embedding}]
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for provider failure
    pub async fn mock_failure(&self, status_code: u16, error_message: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(
                ResponseTemplate::new(status_code).set_body_json(json!({
                    "error": {"message": error_message}
                })),
            )
            .mount(&self.server)
            .await;
    }
}

/// Mock cross-encoder rerank server
pub struct MockRerankServer {
    server: MockServer,
}

impl MockRerankServer {
    /// Start a new mock rerank server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Mount a mock returning the given raw scores by passage index
    pub async fn mock_scores(&self, scores: Vec<f32>) {
        let items: Vec<_> = scores
            .iter()
            .enumerate()
            .map(|(index, score)| json!({"index": index, "score": score}))
            .collect();

        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(items)))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for reranker failure
    pub async fn mock_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(status_code).set_body_string("rerank failed"))
            .mount(&self.server)
            .await;
    }
}
