//! Document and chunk data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authoritative document lifecycle state. Mutated only by pipeline
/// stage completions and by the user-triggered reanalyze/delete actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Normalizing,
    Chunking,
    Embedding,
    Indexing,
    Ready,
    Error,
    Archived,
    Deleting,
}

impl DocumentStatus {
    /// Whether the state machine permits `self -> to`.
    ///
    /// Stage progressions move strictly forward; any state may fail to
    /// `Error`; `Error -> Uploaded` is the reanalyze re-entry;
    /// `Ready -> Archived` and `* -> Deleting` are user-triggered.
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        if to == Self::Deleting {
            return true;
        }
        match self {
            Self::Uploaded => matches!(to, Self::Normalizing | Self::Error),
            Self::Normalizing => matches!(to, Self::Chunking | Self::Error),
            Self::Chunking => matches!(to, Self::Embedding | Self::Error),
            Self::Embedding => matches!(to, Self::Indexing | Self::Error),
            Self::Indexing => matches!(to, Self::Ready | Self::Error),
            Self::Ready => matches!(to, Self::Archived | Self::Error),
            Self::Error => matches!(to, Self::Uploaded),
            Self::Archived | Self::Deleting => false,
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(Self::Uploaded),
            "normalizing" => Ok(Self::Normalizing),
            "chunking" => Ok(Self::Chunking),
            "embedding" => Ok(Self::Embedding),
            "indexing" => Ok(Self::Indexing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            "archived" => Ok(Self::Archived),
            "deleting" => Ok(Self::Deleting),
            _ => Err(format!("Invalid document status: {s}")),
        }
    }
}

impl From<String> for DocumentStatus {
    fn from(s: String) -> Self {
        s.as_str().parse().unwrap_or(Self::Error)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Uploaded => "uploaded",
            Self::Normalizing => "normalizing",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Archived => "archived",
            Self::Deleting => "deleting",
        };
        write!(f, "{status}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub status: DocumentStatus,
    /// Blob key of the original upload
    pub source_key: String,
    /// Blob key of the canonical JSON, set once by the Normalize stage.
    /// Non-null iff status is in {chunking, embedding, indexing, ready}.
    pub canonical_key: Option<String>,
    pub tags: Vec<String>,
    /// Non-null iff status == error
    pub error: Option<String>,
    /// Chunk generation currently visible; bumped on reanalyze
    pub generation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A freshly uploaded document, before any pipeline stage has run
    pub fn new(tenant_id: Uuid, source_key: impl Into<String>, tags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            status: DocumentStatus::Uploaded,
            source_key: source_key.into(),
            canonical_key: None,
            tags,
            error: None,
            generation: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Contiguous 0-based retrieval order, unique per document
    pub chunk_idx: i32,
    pub text: String,
    pub is_header: bool,
    pub is_table: bool,
    pub parent_section: Option<String>,
    pub embedding_model: Option<String>,
    pub embedding_version: Option<String>,
    /// Null until the Index stage stamps it - a null here means
    /// "pending embedding" and makes the chunk re-discoverable
    pub vector_point_id: Option<Uuid>,
    pub generation: i64,
    pub created_at: DateTime<Utc>,
}

/// Chunk draft produced by the Chunk stage, before ids and generation
/// are assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChunk {
    pub chunk_idx: i32,
    pub text: String,
    pub is_header: bool,
    pub is_table: bool,
    pub parent_section: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            DocumentStatus::Uploaded,
            DocumentStatus::Normalizing,
            DocumentStatus::Chunking,
            DocumentStatus::Embedding,
            DocumentStatus::Indexing,
            DocumentStatus::Ready,
            DocumentStatus::Error,
            DocumentStatus::Archived,
            DocumentStatus::Deleting,
        ] {
            assert_eq!(status.to_string().parse::<DocumentStatus>(), Ok(status));
        }
        assert!("bogus".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn pipeline_progression_is_strictly_forward() {
        use DocumentStatus::*;
        assert!(Uploaded.can_transition(Normalizing));
        assert!(Normalizing.can_transition(Chunking));
        assert!(Chunking.can_transition(Embedding));
        assert!(Embedding.can_transition(Indexing));
        assert!(Indexing.can_transition(Ready));
        // No skipping or reversing
        assert!(!Uploaded.can_transition(Chunking));
        assert!(!Ready.can_transition(Chunking));
        assert!(!Chunking.can_transition(Normalizing));
    }

    #[test]
    fn error_reentry_and_side_lifecycles() {
        use DocumentStatus::*;
        assert!(Embedding.can_transition(Error));
        assert!(Error.can_transition(Uploaded));
        assert!(!Error.can_transition(Chunking));
        assert!(Ready.can_transition(Archived));
        assert!(!Archived.can_transition(Uploaded));
        // Delete is allowed from anywhere
        assert!(Ready.can_transition(Deleting));
        assert!(Error.can_transition(Deleting));
        assert!(Uploaded.can_transition(Deleting));
    }
}
