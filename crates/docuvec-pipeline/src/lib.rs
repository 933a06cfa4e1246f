//! Pipeline orchestration: stage implementations, the priority-polling
//! worker loop, and the user-facing document actions
//!
//! Stages are chained through task envelopes carrying the previous
//! stage's structured output, so each stage can be driven directly in
//! tests against a literal payload. The worker claims tasks under a
//! visibility lease, acks late, and retries with exponential backoff.

pub mod actions;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod stages;
pub mod worker;

pub use actions::DocumentService;
pub use envelope::{
    ArtifactRef, CanonicalDocument, ChunkInput, ChunkVector, EmbedInput, IndexInput,
    NormalizeInput, Priority, StageKind, TaskEnvelope, VectorArtifact,
};
pub use error::{PipelineError, PipelineResult, StageError};
pub use queue::InMemoryTaskQueue;
pub use stages::{ChunkStage, DeleteStage, EmbedStage, IndexStage, NormalizeStage};
pub use worker::{PipelineWorker, StageRunner};
