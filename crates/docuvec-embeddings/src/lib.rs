//! Docuvec embedding dispatch crate
//!
//! Multi-model embedding: a read-mostly model registry, per-model
//! per-profile task queues with oneshot replies, an admission-gated
//! worker that micro-batches texts, and a dispatcher that fans one
//! logical request out to every healthy target model.

pub mod embedding;
pub mod error;
pub mod registry;

pub use embedding::{
    DispatcherStats, EmbeddingBatch, EmbeddingDispatcher, EmbeddingPool, EmbeddingProvider,
    EmbeddingRequest, EmbeddingResponse, EmbeddingWorker, HttpEmbeddingProvider, MockProvider,
    ModelError, ModelResult,
};
pub use error::{EmbeddingError, EmbeddingResult};
pub use registry::ModelRegistry;
