//! Task envelopes and persisted artifacts
//!
//! Every queued task carries a `TaskEnvelope`: routing fields plus the
//! previous stage's structured output as a JSON payload. Stages accept
//! and return envelopes so they can be invoked directly in tests
//! against literal payloads, without a live queue.

use docuvec_common::CorrelationId;
use docuvec_parsing::ExtractedTable;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue priority tiers. Lower value dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Interactive chat traffic
    Chat = 0,
    /// File upload intake (Normalize)
    Intake = 1,
    /// Document analysis / OCR
    Analysis = 2,
    /// RAG chunk/embed/index
    Rag = 3,
    /// Cleanup and housekeeping
    Cleanup = 4,
}

impl Priority {
    #[must_use]
    pub const fn value(self) -> i16 {
        self as i16
    }
}

/// Which pipeline stage a task targets. Doubles as the queue task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Normalize,
    Chunk,
    Embed,
    Index,
    Delete,
}

impl StageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Index => "index",
            Self::Delete => "delete",
        }
    }

    /// Default queue priority for tasks of this stage
    #[must_use]
    pub const fn priority(self) -> Priority {
        match self {
            Self::Normalize => Priority::Intake,
            Self::Chunk | Self::Embed | Self::Index => Priority::Rag,
            Self::Delete => Priority::Cleanup,
        }
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normalize" => Ok(Self::Normalize),
            "chunk" => Ok(Self::Chunk),
            "embed" => Ok(Self::Embed),
            "index" => Ok(Self::Index),
            "delete" => Ok(Self::Delete),
            _ => Err(format!("Unknown stage: {s}")),
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued unit of pipeline work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub correlation_id: CorrelationId,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub stage: StageKind,
    /// Stage-specific input, the previous stage's structured output
    pub payload: serde_json::Value,
}

impl TaskEnvelope {
    pub fn new(
        correlation_id: CorrelationId,
        tenant_id: Uuid,
        document_id: Uuid,
        stage: StageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            correlation_id,
            tenant_id,
            document_id,
            stage,
            payload,
        }
    }

    /// Envelope for the stage that follows this one, carrying its output
    #[must_use]
    pub fn follow_up(&self, stage: StageKind, payload: serde_json::Value) -> Self {
        Self {
            correlation_id: self.correlation_id,
            tenant_id: self.tenant_id,
            document_id: self.document_id,
            stage,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeInput {
    /// Blob key of the original upload
    pub source_key: String,
    /// Original filename, drives extractor dispatch
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    /// Blob key of the canonical JSON written by Normalize
    pub canonical_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbedInput {}

/// Pointer to one per-model vector artifact written by Embed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub model: String,
    pub version: String,
    pub dim: usize,
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexInput {
    pub artifacts: Vec<ArtifactRef>,
}

/// The canonical document artifact, written once by Normalize and
/// consumed by Chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub text: String,
    pub tables: Vec<ExtractedTable>,
    pub meta: serde_json::Map<String, serde_json::Value>,
    pub original_filename: String,
    pub extractor: String,
    pub warnings: Vec<String>,
}

/// One chunk's vector inside a per-model artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkVector {
    pub chunk_id: Uuid,
    pub chunk_idx: i32,
    pub vector: Vec<f32>,
}

/// Per-model embedding output staged in the object store between Embed
/// and Index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorArtifact {
    pub model: String,
    pub version: String,
    pub dim: usize,
    pub chunks: Vec<ChunkVector>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_kind_round_trips_and_orders_priorities() {
        for stage in [
            StageKind::Normalize,
            StageKind::Chunk,
            StageKind::Embed,
            StageKind::Index,
            StageKind::Delete,
        ] {
            assert_eq!(stage.as_str().parse::<StageKind>(), Ok(stage));
        }
        assert!(StageKind::Normalize.priority().value() < StageKind::Chunk.priority().value());
        assert!(StageKind::Index.priority().value() < StageKind::Delete.priority().value());
        assert_eq!(Priority::Chat.value(), 0);
        assert_eq!(Priority::Cleanup.value(), 4);
    }

    #[test]
    fn follow_up_keeps_routing_fields() {
        let envelope = TaskEnvelope::new(
            CorrelationId::new(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            StageKind::Normalize,
            serde_json::json!({"source_key": "a/b.txt"}),
        );
        let next = envelope.follow_up(StageKind::Chunk, serde_json::json!({}));
        assert_eq!(next.document_id, envelope.document_id);
        assert_eq!(next.correlation_id, envelope.correlation_id);
        assert_eq!(next.stage, StageKind::Chunk);
    }
}
