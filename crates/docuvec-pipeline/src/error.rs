//! Pipeline error taxonomy
//!
//! Stage failures are either `Retryable` (transient, rescheduled with
//! backoff) or `Fatal` (document marked `error`, re-enterable only via
//! reanalyze). Infrastructure errors default to retryable; only payload
//! corruption and statically invalid state transitions are fatal.

use docuvec_meta_data::DatabaseError;
use docuvec_object_store::StorageError;
use docuvec_parsing::ParsingError;
use docuvec_vector_data::VectorDataError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pipeline error: {0}")]
    Other(String),
}

/// Outcome classification for one stage execution
#[derive(Error, Debug)]
pub enum StageError {
    /// Transient condition; the task is rescheduled with backoff
    #[error("Retryable: {0}")]
    Retryable(String),

    /// Non-recoverable; the document is marked `error` and the task is
    /// not retried
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl StageError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

impl From<DatabaseError> for StageError {
    fn from(err: DatabaseError) -> Self {
        match err {
            // A stage attempting a transition its state machine forbids is
            // a logic-level corruption, not a transient fault
            DatabaseError::InvalidTransition { .. } => Self::Fatal(err.to_string()),
            other => Self::Retryable(other.to_string()),
        }
    }
}

impl From<StorageError> for StageError {
    fn from(err: StorageError) -> Self {
        Self::Retryable(err.to_string())
    }
}

impl From<VectorDataError> for StageError {
    fn from(err: VectorDataError) -> Self {
        Self::Retryable(err.to_string())
    }
}

impl From<ParsingError> for StageError {
    fn from(err: ParsingError) -> Self {
        Self::Fatal(err.to_string())
    }
}
