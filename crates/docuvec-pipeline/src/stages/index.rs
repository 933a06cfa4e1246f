//! Index stage: staged vector artifacts to Qdrant collections

use std::collections::HashMap;
use std::sync::Arc;

use docuvec_meta_data::{Chunk, DocumentRepository, DocumentStatus, generate_point_id};
use docuvec_object_store::{ObjectStore, StorageError};
use docuvec_vector_data::{ChunkPoint, VectorStorage, collection_name};
use tracing::info;
use uuid::Uuid;

use crate::envelope::{IndexInput, TaskEnvelope, VectorArtifact};
use crate::error::StageError;
use crate::stages::{PreconditionMiss, classify_miss};

pub struct IndexStage {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ObjectStore>,
    vectors: Arc<dyn VectorStorage>,
}

impl IndexStage {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        store: Arc<dyn ObjectStore>,
        vectors: Arc<dyn VectorStorage>,
    ) -> Self {
        Self {
            repository,
            store,
            vectors,
        }
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(correlation_id = %envelope.correlation_id, document_id = %envelope.document_id)
    )]
    pub async fn run(&self, envelope: &TaskEnvelope) -> Result<Option<TaskEnvelope>, StageError> {
        let input: IndexInput = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| StageError::Fatal(format!("Malformed index payload: {e}")))?;
        let id = envelope.document_id;

        let Some(document) = self.repository.get_document(id).await? else {
            return Err(StageError::Retryable("document not visible yet".to_string()));
        };
        if document.status != DocumentStatus::Indexing {
            return match classify_miss(DocumentStatus::Indexing, Some(document.status)) {
                PreconditionMiss::Stale => {
                    tracing::warn!(status = %document.status, "Stale index task, skipping");
                    Ok(None)
                }
                PreconditionMiss::Retry(err) => Err(err),
            };
        }

        let chunks = self.repository.list_chunks(id).await?;
        let by_id: HashMap<Uuid, &Chunk> = chunks.iter().map(|c| (c.id, c)).collect();

        let mut total_points = 0_usize;
        for (artifact_pos, artifact_ref) in input.artifacts.iter().enumerate() {
            let bytes = match self.store.get(&artifact_ref.key).await {
                Ok(bytes) => bytes,
                Err(StorageError::NotFound { .. }) => {
                    return Err(StageError::Retryable("artifact_not_ready".to_string()));
                }
                Err(e) => return Err(e.into()),
            };
            let artifact: VectorArtifact = serde_json::from_slice(&bytes)
                .map_err(|e| StageError::Fatal(format!("Corrupt vector artifact: {e}")))?;

            let collection = collection_name(&artifact.model, artifact.dim);
            self.vectors
                .ensure_collection(&collection, artifact.dim)
                .await?;

            let points: Vec<ChunkPoint> = artifact
                .chunks
                .iter()
                .filter_map(|cv| {
                    by_id.get(&cv.chunk_id).map(|chunk| ChunkPoint {
                        id: generate_point_id(id, cv.chunk_idx, &artifact.model, document.generation),
                        vector: cv.vector.clone(),
                        document_id: id,
                        chunk_idx: usize::try_from(cv.chunk_idx).unwrap_or_default(),
                        text: chunk.text.clone(),
                        tags: document.tags.clone(),
                    })
                })
                .collect();
            total_points += self
                .vectors
                .upsert_points(&collection, &points, &envelope.correlation_id)
                .await?;

            // The first artifact is the primary embedding space; its
            // provenance is what chunk rows record
            if artifact_pos == 0 {
                for cv in &artifact.chunks {
                    if by_id.contains_key(&cv.chunk_id) {
                        self.repository
                            .set_chunk_embedding(
                                cv.chunk_id,
                                &artifact.model,
                                &artifact.version,
                                generate_point_id(
                                    id,
                                    cv.chunk_idx,
                                    &artifact.model,
                                    document.generation,
                                ),
                            )
                            .await?;
                    }
                }
            }
        }

        for artifact_ref in &input.artifacts {
            self.store.delete(&artifact_ref.key).await?;
        }

        if !self
            .repository
            .transition_status(
                id,
                DocumentStatus::Indexing,
                DocumentStatus::Ready,
                &envelope.correlation_id,
            )
            .await?
        {
            return Err(StageError::Retryable(
                "document left indexing state mid-stage".to_string(),
            ));
        }

        info!(
            points = total_points,
            collections = input.artifacts.len(),
            "Indexed document, ready for search"
        );
        Ok(None)
    }
}
