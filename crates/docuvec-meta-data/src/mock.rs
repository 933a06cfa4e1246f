//! In-memory repository double for tests that should not touch
//! `PostgreSQL`

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use docuvec_common::CorrelationId;
use uuid::Uuid;

use crate::error::{DatabaseError, DatabaseResult};
use crate::models::{Chunk, Document, DocumentStatus, NewChunk};
use crate::traits::DocumentRepository;

#[derive(Default)]
struct RepoState {
    documents: HashMap<Uuid, Document>,
    chunks: Vec<Chunk>,
}

/// Mock repository backed by in-process maps. Enforces the same status
/// state machine as the real one so stage tests exercise precondition
/// failures honestly.
#[derive(Default)]
pub struct MockRepository {
    state: Mutex<RepoState>,
}

impl MockRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Test helper: current status of a document, if it exists
    pub fn status_of(&self, id: Uuid) -> Option<DocumentStatus> {
        self.lock().documents.get(&id).map(|d| d.status)
    }

    /// Test helper: chunk count for the document's current generation
    pub fn chunk_count(&self, document_id: Uuid) -> usize {
        let state = self.lock();
        let generation = state
            .documents
            .get(&document_id)
            .map_or(0, |d| d.generation);
        state
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id && c.generation == generation)
            .count()
    }
}

#[async_trait]
impl DocumentRepository for MockRepository {
    async fn create_document(&self, document: &Document) -> DatabaseResult<()> {
        self.lock().documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> DatabaseResult<Option<Document>> {
        Ok(self.lock().documents.get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        _correlation_id: &CorrelationId,
    ) -> DatabaseResult<bool> {
        if !from.can_transition(to) {
            return Err(DatabaseError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let mut state = self.lock();
        match state.documents.get_mut(&id) {
            Some(doc) if doc.status == from => {
                doc.status = to;
                doc.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_canonical_key(&self, id: Uuid, canonical_key: &str) -> DatabaseResult<()> {
        let mut state = self.lock();
        let doc = state.documents.get_mut(&id).ok_or(DatabaseError::NotFound {
            entity: "document",
            id: id.to_string(),
        })?;
        doc.canonical_key = Some(canonical_key.to_string());
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> DatabaseResult<()> {
        let mut state = self.lock();
        let doc = state.documents.get_mut(&id).ok_or(DatabaseError::NotFound {
            entity: "document",
            id: id.to_string(),
        })?;
        doc.status = DocumentStatus::Error;
        doc.error = Some(message.to_string());
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_for_reanalyze(&self, id: Uuid) -> DatabaseResult<i64> {
        let mut state = self.lock();
        let doc = state.documents.get_mut(&id).ok_or(DatabaseError::NotFound {
            entity: "document (in error/ready state)",
            id: id.to_string(),
        })?;
        if !matches!(doc.status, DocumentStatus::Error | DocumentStatus::Ready) {
            return Err(DatabaseError::NotFound {
                entity: "document (in error/ready state)",
                id: id.to_string(),
            });
        }
        doc.status = DocumentStatus::Uploaded;
        doc.error = None;
        doc.canonical_key = None;
        doc.generation += 1;
        doc.updated_at = Utc::now();
        Ok(doc.generation)
    }

    async fn replace_generation(
        &self,
        document_id: Uuid,
        generation: i64,
        chunks: &[NewChunk],
    ) -> DatabaseResult<Vec<Uuid>> {
        let mut state = self.lock();
        let superseded: Vec<Uuid> = state
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id && c.generation < generation)
            .filter_map(|c| c.vector_point_id)
            .collect();
        state
            .chunks
            .retain(|c| !(c.document_id == document_id && c.generation < generation));
        for chunk in chunks {
            state.chunks.push(Chunk {
                id: Uuid::new_v4(),
                document_id,
                chunk_idx: chunk.chunk_idx,
                text: chunk.text.clone(),
                is_header: chunk.is_header,
                is_table: chunk.is_table,
                parent_section: chunk.parent_section.clone(),
                embedding_model: None,
                embedding_version: None,
                vector_point_id: None,
                generation,
                created_at: Utc::now(),
            });
        }
        Ok(superseded)
    }

    async fn pending_chunks(&self, document_id: Uuid) -> DatabaseResult<Vec<Chunk>> {
        let state = self.lock();
        let mut pending: Vec<Chunk> = state
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id && c.vector_point_id.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.chunk_idx);
        Ok(pending)
    }

    async fn set_chunk_embedding(
        &self,
        chunk_id: Uuid,
        model: &str,
        version: &str,
        point_id: Uuid,
    ) -> DatabaseResult<()> {
        let mut state = self.lock();
        let chunk = state
            .chunks
            .iter_mut()
            .find(|c| c.id == chunk_id)
            .ok_or(DatabaseError::NotFound {
                entity: "chunk",
                id: chunk_id.to_string(),
            })?;
        chunk.embedding_model = Some(model.to_string());
        chunk.embedding_version = Some(version.to_string());
        chunk.vector_point_id = Some(point_id);
        Ok(())
    }

    async fn list_chunks(&self, document_id: Uuid) -> DatabaseResult<Vec<Chunk>> {
        let state = self.lock();
        let generation = state
            .documents
            .get(&document_id)
            .map_or(0, |d| d.generation);
        let mut chunks: Vec<Chunk> = state
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id && c.generation == generation)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_idx);
        Ok(chunks)
    }

    async fn delete_document(
        &self,
        id: Uuid,
        _correlation_id: &CorrelationId,
    ) -> DatabaseResult<Vec<Uuid>> {
        let mut state = self.lock();
        let point_ids: Vec<Uuid> = state
            .chunks
            .iter()
            .filter(|c| c.document_id == id)
            .filter_map(|c| c.vector_point_id)
            .collect();
        state.chunks.retain(|c| c.document_id != id);
        state.documents.remove(&id);
        Ok(point_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_repo_enforces_state_machine() {
        let repo = MockRepository::new();
        let doc = Document::new(Uuid::new_v4(), "t/doc.txt", vec![]);
        repo.create_document(&doc).await.unwrap();
        let cid = CorrelationId::new();

        assert!(
            repo.transition_status(
                doc.id,
                DocumentStatus::Uploaded,
                DocumentStatus::Normalizing,
                &cid
            )
            .await
            .unwrap()
        );
        // Stale precondition: already moved past uploaded
        assert!(
            !repo
                .transition_status(
                    doc.id,
                    DocumentStatus::Uploaded,
                    DocumentStatus::Normalizing,
                    &cid
                )
                .await
                .unwrap()
        );
        // Statically illegal jump
        assert!(
            repo.transition_status(
                doc.id,
                DocumentStatus::Normalizing,
                DocumentStatus::Ready,
                &cid
            )
            .await
            .is_err()
        );
    }

    #[tokio::test]
    async fn replace_generation_reports_superseded_points() {
        let repo = MockRepository::new();
        let doc = Document::new(Uuid::new_v4(), "t/doc.txt", vec![]);
        repo.create_document(&doc).await.unwrap();

        let drafts = vec![NewChunk {
            chunk_idx: 0,
            text: "old".into(),
            is_header: false,
            is_table: false,
            parent_section: None,
        }];
        repo.replace_generation(doc.id, 0, &drafts).await.unwrap();
        let pending = repo.pending_chunks(doc.id).await.unwrap();
        let point = Uuid::new_v4();
        repo.set_chunk_embedding(pending[0].id, "minilm", "v1", point)
            .await
            .unwrap();

        let superseded = repo.replace_generation(doc.id, 1, &drafts).await.unwrap();
        assert_eq!(superseded, vec![point]);
        assert_eq!(repo.pending_chunks(doc.id).await.unwrap().len(), 1);
    }
}
