//! Storage abstraction for vector index backends.
//!
//! Collections are one-per-embedding-space (`{model_alias}_{dim}`), so every
//! operation names its collection explicitly rather than binding one at
//! construction time.

use async_trait::async_trait;
use docuvec_common::CorrelationId;
use uuid::Uuid;

use crate::VectorDataResult;

/// A chunk embedding ready for upsert: the vector plus the payload that
/// makes search results self-describing.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Deterministic point id (stable across re-runs of the same generation)
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub document_id: Uuid,
    pub chunk_idx: usize,
    pub text: String,
    pub tags: Vec<String>,
}

/// Search hit with its payload reconstructed from the backend.
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_idx: usize,
    pub text: String,
    pub tags: Vec<String>,
    pub similarity: f32,
}

#[async_trait]
pub trait VectorStorage: Send + Sync {
    /// Create the collection sized to `dim` if it does not exist yet.
    /// Idempotent, race-tolerant.
    async fn ensure_collection(&self, collection: &str, dim: usize) -> VectorDataResult<()>;

    async fn collection_exists(&self, collection: &str) -> VectorDataResult<bool>;

    /// Drop the collection and all its points. Returns whether it existed.
    async fn drop_collection(&self, collection: &str) -> VectorDataResult<bool>;

    /// Upsert points, creating the collection lazily from the first point's
    /// dimension. Rejects points whose vectors disagree with the collection
    /// dimension. Returns how many points were written.
    async fn upsert_points(
        &self,
        collection: &str,
        points: &[ChunkPoint],
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<usize>;

    /// Nearest-neighbor search, optionally restricted to one document.
    async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        limit: usize,
        document_id: Option<Uuid>,
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<Vec<VectorSearchResult>>;

    /// Delete specific points by id.
    async fn delete_points(&self, collection: &str, point_ids: &[Uuid]) -> VectorDataResult<()>;

    /// Delete every point belonging to a document.
    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: Uuid,
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<()>;
}
