//! Configuration error types

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Invalid range value
    #[error("Value {value} is out of range for {field} (expected {min}-{max})")]
    OutOfRange {
        field: String,
        value: u64,
        min: u64,
        max: u64,
    },

    /// A profile default references a model alias that is not registered
    #[error("Unknown model alias '{alias}' in defaults for profile '{profile}'")]
    UnknownModelAlias { alias: String, profile: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error message
    #[error("Configuration error: {message}")]
    Generic { message: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
