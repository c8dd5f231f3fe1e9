//! Cross-encoder rerank client

use std::time::Duration;

use reqwest::Client;
use setlist_shared_config::RerankerConfig;
use tracing::debug;

use crate::error::{InferenceError, InferenceResult};
use crate::models::{RerankRequest, RerankResponseItem};
use crate::retry::truncate_error_body;

/// Client for a text-embeddings-inference style `/rerank` endpoint
///
/// Unlike the embedding client this does not retry: reranking is a
/// best-effort stage and its caller falls back to composite ordering on
/// any failure, so a failed call should surface quickly.
#[derive(Debug, Clone)]
pub struct RerankClient {
    http_client: Client,
    rerank_url: String,
}

impl RerankClient {
    /// Create a new rerank client; returns None when no URL is configured
    pub fn new(config: &RerankerConfig) -> InferenceResult<Option<Self>> {
        let Some(rerank_url) = config.rerank_url() else {
            return Ok(None);
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(config.max_concurrency)
            .build()
            .map_err(InferenceError::HttpError)?;

        Ok(Some(Self {
            http_client,
            rerank_url,
        }))
    }

    /// Score each passage against the query
    ///
    /// Returns one raw score per input passage, in input order. Missing
    /// indices in the response default to 0.0.
    pub async fn score(&self, query: &str, passages: &[String]) -> InferenceResult<Vec<f32>> {
        let request = RerankRequest {
            query: query.to_string(),
            texts: passages.to_vec(),
        };

        let response = self
            .http_client
            .post(&self.rerank_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    InferenceError::ConnectionRefused(self.rerank_url.clone())
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

        let items: Vec<RerankResponseItem> = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        let mut scores = vec![0.0_f32; passages.len()];
        for item in items {
            if item.index < scores.len() {
                scores[item.index] = item.score;
            }
        }

        debug!(passages = passages.len(), "Scored rerank batch");
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_disabled_when_unconfigured() {
        let client = RerankClient::new(&RerankerConfig::default()).unwrap();
        assert!(client.is_none());
    }

    #[tokio::test]
    async fn test_score_maps_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"index": 2, "score": 5.0},
                {"index": 0, "score": -1.5}
            ])))
            .mount(&server)
            .await;

        let client = RerankClient::new(&RerankerConfig::with_url(server.uri()))
            .unwrap()
            .unwrap();
        let scores = client
            .score(
                "warm jazz",
                &["a".to_string(), "b".to_string(), "c".to_string()],
            )
            .await
            .unwrap();

        assert!((scores[0] - (-1.5)).abs() < f32::EPSILON);
        assert!((scores[1] - 0.0).abs() < f32::EPSILON);
        assert!((scores[2] - 5.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_score_surfaces_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;

        let client = RerankClient::new(&RerankerConfig::with_url(server.uri()))
            .unwrap()
            .unwrap();
        let result = client.score("warm jazz", &["a".to_string()]).await;
        assert!(matches!(
            result,
            Err(InferenceError::ServerError { status: 500, .. })
        ));
    }
}
