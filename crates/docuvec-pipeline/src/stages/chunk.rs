//! Chunk stage: canonical JSON to a fresh chunk generation

use std::sync::Arc;

use docuvec_common::ErrorContext;
use docuvec_embeddings::ModelRegistry;
use docuvec_meta_data::{DocumentRepository, DocumentStatus, NewChunk};
use docuvec_object_store::{ObjectStore, StorageError};
use docuvec_parsing::AdaptiveChunker;
use docuvec_vector_data::{VectorStorage, collection_name};
use tracing::info;

use crate::envelope::{CanonicalDocument, ChunkInput, EmbedInput, StageKind, TaskEnvelope};
use crate::error::StageError;
use crate::stages::{PreconditionMiss, classify_miss};

pub struct ChunkStage {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ObjectStore>,
    vectors: Arc<dyn VectorStorage>,
    registry: Arc<ModelRegistry>,
    chunker: AdaptiveChunker,
}

impl ChunkStage {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        store: Arc<dyn ObjectStore>,
        vectors: Arc<dyn VectorStorage>,
        registry: Arc<ModelRegistry>,
        chunker: AdaptiveChunker,
    ) -> Self {
        Self {
            repository,
            store,
            vectors,
            registry,
            chunker,
        }
    }

    /// Remove superseded points so only the latest chunk generation is
    /// searchable
    async fn purge_superseded(&self, superseded: &[uuid::Uuid]) -> Result<(), StageError> {
        if superseded.is_empty() {
            return Ok(());
        }
        for spec in self.registry.list_models() {
            let collection = collection_name(&spec.alias, spec.dim);
            if self.vectors.collection_exists(&collection).await? {
                self.vectors.delete_points(&collection, superseded).await?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(correlation_id = %envelope.correlation_id, document_id = %envelope.document_id)
    )]
    pub async fn run(&self, envelope: &TaskEnvelope) -> Result<Option<TaskEnvelope>, StageError> {
        let input: ChunkInput = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| StageError::Fatal(format!("Malformed chunk payload: {e}")))?;
        let id = envelope.document_id;

        let Some(document) = self.repository.get_document(id).await? else {
            return Err(StageError::Retryable("document not visible yet".to_string()));
        };
        if document.status != DocumentStatus::Chunking {
            return match classify_miss(DocumentStatus::Chunking, Some(document.status)) {
                PreconditionMiss::Stale => {
                    tracing::warn!(status = %document.status, "Stale chunk task, skipping");
                    Ok(None)
                }
                PreconditionMiss::Retry(err) => Err(err),
            };
        }

        let bytes = match self.store.get(&input.canonical_key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => {
                return Err(StageError::Retryable("canonical_not_ready".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let canonical: CanonicalDocument = serde_json::from_slice(&bytes)
            .context("Corrupt canonical artifact")
            .map_err(StageError::Fatal)?;

        let mut drafts = self.chunker.chunk(&canonical.text);
        for table in &canonical.tables {
            for mut draft in self.chunker.chunk(&table.csv) {
                draft.is_table = true;
                draft.parent_section = Some(table.name.clone());
                drafts.push(draft);
            }
        }
        if drafts.is_empty() {
            return Err(StageError::Fatal(
                "Canonical document produced zero chunks".to_string(),
            ));
        }

        let chunks: Vec<NewChunk> = drafts
            .into_iter()
            .enumerate()
            .map(|(idx, draft)| NewChunk {
                chunk_idx: i32::try_from(idx).unwrap_or(i32::MAX),
                text: draft.text,
                is_header: draft.is_header,
                is_table: draft.is_table,
                parent_section: draft.parent_section,
            })
            .collect();

        let superseded = self
            .repository
            .replace_generation(id, document.generation, &chunks)
            .await?;
        self.purge_superseded(&superseded).await?;

        if !self
            .repository
            .transition_status(
                id,
                DocumentStatus::Chunking,
                DocumentStatus::Embedding,
                &envelope.correlation_id,
            )
            .await?
        {
            return Err(StageError::Retryable(
                "document left chunking state mid-stage".to_string(),
            ));
        }

        info!(
            chunk_count = chunks.len(),
            generation = document.generation,
            superseded = superseded.len(),
            "Chunked document"
        );
        let payload = serde_json::to_value(EmbedInput::default())
            .map_err(|e| StageError::Fatal(e.to_string()))?;
        Ok(Some(envelope.follow_up(StageKind::Embed, payload)))
    }
}
