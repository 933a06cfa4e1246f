//! Error types for the docuvec-parsing crate
//!
//! Extraction is deliberately best-effort: format extractors degrade to empty
//! text plus warnings instead of failing, so the only hard errors left are
//! chunker construction mistakes.

use thiserror::Error;

/// Result type alias for parsing operations
pub type ParsingResult<T> = Result<T, ParsingError>;

/// Errors surfaced by chunker construction
#[derive(Error, Debug)]
pub enum ParsingError {
    /// Chunker was configured with impossible parameters
    #[error("Invalid chunking parameters: {0}")]
    InvalidChunking(String),
}
