//! Request and response types for the inference endpoints

use serde::{Deserialize, Serialize};

/// OpenAI-compatible embeddings request
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    /// Model name
    pub model: String,
    /// One or more input texts
    pub input: Vec<String>,
    /// Requested output dimension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

/// Single embedding datum in the response
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingData {
    /// Index into the request's input list
    pub index: usize,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

/// OpenAI-compatible embeddings response
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    /// Embedding vectors, one per input
    pub data: Vec<EmbeddingData>,
}

/// Rerank request: score each text against the query
#[derive(Debug, Clone, Serialize)]
pub struct RerankRequest {
    /// The search query
    pub query: String,
    /// Passage texts to score
    pub texts: Vec<String>,
}

/// One scored passage from the reranker
#[derive(Debug, Clone, Deserialize)]
pub struct RerankResponseItem {
    /// Index into the request's texts list
    pub index: usize,
    /// Raw cross-encoder score (unbounded logit)
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_request_omits_missing_dimensions() {
        let request = EmbeddingRequest {
            model: "text-embedding-3-small".to_string(),
            input: vec!["upbeat pop".to_string()],
            dimensions: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("dimensions"));
    }

    #[test]
    fn test_rerank_response_parsing() {
        let body = r#"[{"index": 1, "score": 4.25}, {"index": 0, "score": -2.0}]"#;
        let items: Vec<RerankResponseItem> = serde_json::from_str(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].index, 1);
        assert!((items[1].score - (-2.0)).abs() < f32::EPSILON);
    }
}
