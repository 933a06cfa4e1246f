//! Error types for vector index operations

use thiserror::Error;

pub type VectorDataResult<T> = Result<T, VectorDataError>;

#[derive(Error, Debug)]
pub enum VectorDataError {
    /// Vector length does not match the collection's configured dimension
    #[error("Vector dimension mismatch in '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    /// Collection create/drop/describe failed
    #[error("Collection operation failed: {0}")]
    Collection(String),

    /// Storage backend specific error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic error for other issues
    #[error("Other error: {0}")]
    Other(String),
}

impl From<anyhow::Error> for VectorDataError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
