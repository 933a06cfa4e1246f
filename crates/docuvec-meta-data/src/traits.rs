//! Repository trait for document and chunk metadata

use async_trait::async_trait;
use docuvec_common::CorrelationId;
use uuid::Uuid;

use crate::error::DatabaseResult;
use crate::models::{Chunk, Document, DocumentStatus, NewChunk};

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create_document(&self, document: &Document) -> DatabaseResult<()>;

    async fn get_document(&self, id: Uuid) -> DatabaseResult<Option<Document>>;

    /// Atomically move a document from `from` to `to`. Returns false when
    /// the document is not currently in `from` (the stage's precondition
    /// failed - duplicate or out-of-order delivery). Statically invalid
    /// transitions are an `InvalidTransition` error.
    async fn transition_status(
        &self,
        id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        correlation_id: &CorrelationId,
    ) -> DatabaseResult<bool>;

    /// Record where the canonical JSON landed (set once by Normalize)
    async fn set_canonical_key(&self, id: Uuid, canonical_key: &str) -> DatabaseResult<()>;

    /// Terminal stage failure: status=error with a human-readable message
    async fn mark_error(&self, id: Uuid, message: &str) -> DatabaseResult<()>;

    /// Reanalyze re-entry: error -> uploaded, clears the error message,
    /// bumps and returns the new chunk generation.
    async fn reset_for_reanalyze(&self, id: Uuid) -> DatabaseResult<i64>;

    /// Replace the document's visible chunk set with `chunks` at
    /// `generation`: deletes every chunk of an earlier generation and
    /// inserts the new batch in one transaction. Returns the vector point
    /// ids of superseded chunks so the caller can purge stale vectors.
    async fn replace_generation(
        &self,
        document_id: Uuid,
        generation: i64,
        chunks: &[NewChunk],
    ) -> DatabaseResult<Vec<Uuid>>;

    /// Chunks still awaiting a vector (`vector_point_id IS NULL`),
    /// ordered by `chunk_idx`. The Embed stage resumes from this scan
    /// after partial failure.
    async fn pending_chunks(&self, document_id: Uuid) -> DatabaseResult<Vec<Chunk>>;

    /// Stamp embedding provenance on a chunk after its point is indexed
    async fn set_chunk_embedding(
        &self,
        chunk_id: Uuid,
        model: &str,
        version: &str,
        point_id: Uuid,
    ) -> DatabaseResult<()>;

    /// All chunks of the document's current generation, ordered by
    /// `chunk_idx`
    async fn list_chunks(&self, document_id: Uuid) -> DatabaseResult<Vec<Chunk>>;

    /// Tombstone-delete: removes the document and its chunks, returning
    /// the vector point ids that need cascading out of the index.
    async fn delete_document(
        &self,
        id: Uuid,
        correlation_id: &CorrelationId,
    ) -> DatabaseResult<Vec<Uuid>>;
}
