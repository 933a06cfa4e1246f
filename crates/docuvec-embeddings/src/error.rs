//! Error types for the docuvec-embeddings crate

use std::time::Duration;

use thiserror::Error;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Admission gate is at capacity. Retryable: callers should back off
    /// for at least `retry_after`.
    #[error("Embedding service overloaded, retry after {retry_after:?}")]
    Overloaded { retry_after: Duration },

    /// Model alias is not registered or has no queue for the profile
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model did not reply within the profile's wait timeout
    #[error("Model '{model}' timed out after {waited:?}")]
    Timeout { model: String, waited: Duration },

    /// Inference backend request failed
    #[error("Network error: {0}")]
    Network(String),

    /// Embedding generation specific errors (count or dimension mismatch,
    /// backend-reported failure)
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error for other cases
    #[error("Other error: {0}")]
    Other(String),
}

impl EmbeddingError {
    /// Whether a caller should retry after a delay rather than give up
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Overloaded { .. } | Self::Timeout { .. } | Self::Network(_)
        )
    }
}

impl From<anyhow::Error> for EmbeddingError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
