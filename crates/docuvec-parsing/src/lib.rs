//! Docuvec document parsing crate
//!
//! Turns uploaded bytes into canonical text: format-specific extraction
//! (pdf/docx/csv/xlsx/plain text), deterministic normalization, and
//! structure-aware chunking.

pub mod chunking;
pub mod error;
pub mod extract;
pub mod normalize;

pub use chunking::{AdaptiveChunker, ChunkDraft};
pub use error::{ParsingError, ParsingResult};
pub use extract::{ExtractedDocument, ExtractedTable, extract};
pub use normalize::normalize;
