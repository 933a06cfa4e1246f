//! Error types for metadata storage operations

use thiserror::Error;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database query failed during {operation}: {source}")]
    Query {
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The state machine forbids this transition regardless of current
    /// database state
    #[error("Invalid document status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Attach the failing operation name to an sqlx error
pub(crate) trait SqlxResultExt<T> {
    fn map_db_err(self, operation: &str) -> DatabaseResult<T>;
}

impl<T> SqlxResultExt<T> for Result<T, sqlx::Error> {
    fn map_db_err(self, operation: &str) -> DatabaseResult<T> {
        self.map_err(|source| DatabaseError::Query {
            operation: operation.to_string(),
            source,
        })
    }
}
