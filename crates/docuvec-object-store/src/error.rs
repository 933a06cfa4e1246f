use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;
