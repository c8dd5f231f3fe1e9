//! Shared retry policy for the inference clients

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{InferenceError, InferenceResult};

/// Maximum error body size kept in error messages
pub(crate) const MAX_ERROR_BODY_SIZE: usize = 1000;

/// Retry policy: attempts with exponential backoff between them
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Execute an async operation, retrying transient failures
    pub async fn run<T, F, Fut>(&self, operation: F) -> InferenceResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = InferenceResult<T>>,
    {
        if self.attempts == 0 {
            return operation().await;
        }

        let mut last_error = None;

        for attempt in 0..self.attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < self.attempts - 1 {
                        let delay = self
                            .base_delay
                            .saturating_mul(2_u32.pow(attempt))
                            .min(self.max_delay);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = self.attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying after transient error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(InferenceError::RetriesExhausted {
            attempts: self.attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

/// Truncate an error body at a UTF-8 boundary
pub(crate) fn truncate_error_body(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY_SIZE {
        return body;
    }

    let truncate_at = body
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
        .last()
        .unwrap_or(0);

    format!("{}... (truncated)", &body[..truncate_at])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_gives_up_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: InferenceResult<()> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(InferenceError::ServerError {
                        status: 400,
                        body: "bad request".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err(InferenceError::ServerError {
                            status: 503,
                            body: "warming up".to_string(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let policy = RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result: InferenceResult<()> = policy
            .run(|| async {
                Err(InferenceError::ServerError {
                    status: 503,
                    body: "down".to_string(),
                })
            })
            .await;

        match result {
            Err(InferenceError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_truncate_error_body_short() {
        assert_eq!(truncate_error_body("short".to_string()), "short");
    }

    #[test]
    fn test_truncate_error_body_long() {
        let long = "x".repeat(5000);
        let truncated = truncate_error_body(long);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() < 1100);
    }
}
