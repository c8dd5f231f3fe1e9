//! Error types for the inference clients

use thiserror::Error;

/// Errors from the embedding and rerank clients
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Underlying HTTP transport error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server refused the connection
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Non-success status returned by the server
    #[error("server returned {status}: {body}")]
    ServerError { status: u16, body: String },

    /// Response body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Embedding dimension did not match the configured dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// All retry attempts were exhausted
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl InferenceError {
    /// Whether the operation can be safely retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::ConnectionRefused(_) => true,
            // 5xx and 429 are transient; 4xx are caller bugs
            Self::ServerError { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse(_)
            | Self::DimensionMismatch { .. }
            | Self::RetriesExhausted { .. } => false,
        }
    }
}

/// Result type for inference operations
pub type InferenceResult<T> = Result<T, InferenceError>;
