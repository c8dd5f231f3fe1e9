//! HTTP clients for external model inference
//!
//! Two small clients sharing one retry policy:
//! - [`EmbeddingClient`] - OpenAI-compatible `/v1/embeddings` endpoint,
//!   used by the search path to embed queries and by ingestion to embed
//!   catalog text in batches.
//! - [`RerankClient`] - text-embeddings-inference style `/rerank`
//!   endpoint scoring (query, passage) pairs with a cross-encoder.

mod embedding;
mod error;
mod models;
mod rerank;
mod retry;

pub use embedding::EmbeddingClient;
pub use error::{InferenceError, InferenceResult};
pub use models::{
    EmbeddingData, EmbeddingRequest, EmbeddingResponse, RerankRequest, RerankResponseItem,
};
pub use rerank::RerankClient;
