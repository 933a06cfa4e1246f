//! Normalize stage: raw upload bytes to canonical JSON

use std::sync::Arc;

use bytes::Bytes;
use docuvec_meta_data::{DocumentRepository, DocumentStatus};
use docuvec_object_store::{ObjectStore, StorageError, canonical_key};
use docuvec_parsing::{extract, normalize};
use tracing::info;

use crate::envelope::{CanonicalDocument, ChunkInput, NormalizeInput, StageKind, TaskEnvelope};
use crate::error::StageError;
use crate::stages::{PreconditionMiss, classify_miss};

pub struct NormalizeStage {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ObjectStore>,
}

impl NormalizeStage {
    pub fn new(repository: Arc<dyn DocumentRepository>, store: Arc<dyn ObjectStore>) -> Self {
        Self { repository, store }
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(correlation_id = %envelope.correlation_id, document_id = %envelope.document_id)
    )]
    pub async fn run(&self, envelope: &TaskEnvelope) -> Result<Option<TaskEnvelope>, StageError> {
        let input: NormalizeInput = serde_json::from_value(envelope.payload.clone())
            .map_err(|e| StageError::Fatal(format!("Malformed normalize payload: {e}")))?;
        let id = envelope.document_id;

        let entered = self
            .repository
            .transition_status(
                id,
                DocumentStatus::Uploaded,
                DocumentStatus::Normalizing,
                &envelope.correlation_id,
            )
            .await?;
        if !entered {
            let status = self.repository.get_document(id).await?.map(|d| d.status);
            return match classify_miss(DocumentStatus::Uploaded, status) {
                PreconditionMiss::Stale => {
                    tracing::warn!(status = ?status, "Stale normalize task, skipping");
                    Ok(None)
                }
                PreconditionMiss::Retry(err) => Err(err),
            };
        }

        let bytes = match self.store.get(&input.source_key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => {
                return Err(StageError::Retryable("source_not_ready".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let extracted = extract(&bytes, &input.filename);
        if extracted.text.trim().is_empty() && extracted.tables.is_empty() {
            return Err(StageError::Fatal(format!(
                "No extractable content in '{}': {}",
                input.filename,
                extracted.warnings.join("; ")
            )));
        }

        let canonical = CanonicalDocument {
            text: normalize(&extracted.text),
            tables: extracted.tables,
            meta: extracted.meta,
            original_filename: input.filename.clone(),
            extractor: extracted.extractor,
            warnings: extracted.warnings,
        };
        let key = canonical_key(id);
        let body = serde_json::to_vec(&canonical)
            .map_err(|e| StageError::Fatal(format!("Canonical serialization failed: {e}")))?;
        self.store.put(&key, Bytes::from(body)).await?;
        self.repository.set_canonical_key(id, &key).await?;

        if !self
            .repository
            .transition_status(
                id,
                DocumentStatus::Normalizing,
                DocumentStatus::Chunking,
                &envelope.correlation_id,
            )
            .await?
        {
            return Err(StageError::Retryable(
                "document left normalizing state mid-stage".to_string(),
            ));
        }

        info!(
            filename = %input.filename,
            extractor = %canonical.extractor,
            text_len = canonical.text.len(),
            tables = canonical.tables.len(),
            warnings = canonical.warnings.len(),
            "Normalized document"
        );
        let payload = serde_json::to_value(ChunkInput {
            canonical_key: key,
        })
        .map_err(|e| StageError::Fatal(e.to_string()))?;
        Ok(Some(envelope.follow_up(StageKind::Chunk, payload)))
    }
}
