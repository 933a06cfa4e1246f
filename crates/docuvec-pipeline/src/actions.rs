//! User-triggered document actions
//!
//! These sit in front of the pipeline: they write the upload blob, flip
//! the side-lifecycle states, and enqueue the first task. Everything
//! after that happens through the worker loop.

use std::sync::Arc;

use bytes::Bytes;
use docuvec_common::CorrelationId;
use docuvec_config::PipelineConfig;
use docuvec_meta_data::{Document, DocumentRepository, DocumentStatus, TaskQueue};
use docuvec_object_store::{ObjectStore, source_key};
use tracing::{info, warn};
use uuid::Uuid;

use crate::envelope::{NormalizeInput, StageKind, TaskEnvelope};
use crate::error::{PipelineError, PipelineResult};
use crate::worker::stage_max_attempts;

pub struct DocumentService {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn TaskQueue>,
    config: PipelineConfig,
}

impl DocumentService {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn TaskQueue>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repository,
            store,
            queue,
            config,
        }
    }

    /// Accept an upload: store the original bytes, create the document
    /// row in `uploaded`, and enqueue the Normalize task.
    pub async fn upload(
        &self,
        tenant_id: Uuid,
        filename: &str,
        content: Bytes,
        tags: Vec<String>,
    ) -> PipelineResult<Document> {
        let mut document = Document::new(tenant_id, String::new(), tags);
        let key = source_key(document.id, filename);
        document.source_key.clone_from(&key);

        let correlation_id = CorrelationId::new();
        self.store.put(&key, content).await?;
        self.repository.create_document(&document).await?;

        self.enqueue_normalize(&document, filename, &correlation_id)
            .await?;

        info!(
            correlation_id = %correlation_id,
            document_id = %document.id,
            tenant_id = %tenant_id,
            filename,
            "Document uploaded"
        );
        Ok(document)
    }

    /// Re-enter the pipeline for a document that finished in `error` or
    /// `ready`. Bumps the chunk generation and returns it.
    pub async fn reanalyze(&self, document_id: Uuid) -> PipelineResult<i64> {
        let generation = self.repository.reset_for_reanalyze(document_id).await?;
        let document = self
            .repository
            .get_document(document_id)
            .await?
            .ok_or_else(|| PipelineError::Other(format!("Document {document_id} not found")))?;

        // Filename for extractor dispatch comes back out of the source key
        let filename = document
            .source_key
            .rsplit('/')
            .next()
            .unwrap_or(document.source_key.as_str())
            .to_string();

        let correlation_id = CorrelationId::new();
        self.enqueue_normalize(&document, &filename, &correlation_id)
            .await?;

        info!(
            correlation_id = %correlation_id,
            document_id = %document_id,
            generation,
            "Document reanalysis queued"
        );
        Ok(generation)
    }

    /// Archive a ready document. Archived documents keep their chunks
    /// and vectors but accept no further pipeline work.
    pub async fn archive(&self, document_id: Uuid) -> PipelineResult<()> {
        let correlation_id = CorrelationId::new();
        let moved = self
            .repository
            .transition_status(
                document_id,
                DocumentStatus::Ready,
                DocumentStatus::Archived,
                &correlation_id,
            )
            .await?;
        if !moved {
            return Err(PipelineError::Other(format!(
                "Document {document_id} is not ready, cannot archive"
            )));
        }
        Ok(())
    }

    /// Tombstone a document and enqueue the cascade: chunk rows, vector
    /// points, and blobs are removed by the Delete stage.
    pub async fn delete(&self, document_id: Uuid) -> PipelineResult<()> {
        let correlation_id = CorrelationId::new();
        let Some(document) = self.repository.get_document(document_id).await? else {
            warn!(document_id = %document_id, "Delete requested for unknown document");
            return Ok(());
        };

        if document.status != DocumentStatus::Deleting {
            self.repository
                .transition_status(
                    document_id,
                    document.status,
                    DocumentStatus::Deleting,
                    &correlation_id,
                )
                .await?;
        }

        let envelope = TaskEnvelope::new(
            correlation_id,
            document.tenant_id,
            document_id,
            StageKind::Delete,
            serde_json::Value::Null,
        );
        self.enqueue(&envelope).await?;

        info!(
            correlation_id = %correlation_id,
            document_id = %document_id,
            "Document deletion queued"
        );
        Ok(())
    }

    async fn enqueue_normalize(
        &self,
        document: &Document,
        filename: &str,
        correlation_id: &CorrelationId,
    ) -> PipelineResult<()> {
        let input = NormalizeInput {
            source_key: document.source_key.clone(),
            filename: filename.to_string(),
        };
        let envelope = TaskEnvelope::new(
            *correlation_id,
            document.tenant_id,
            document.id,
            StageKind::Normalize,
            serde_json::to_value(&input)?,
        );
        self.enqueue(&envelope).await
    }

    async fn enqueue(&self, envelope: &TaskEnvelope) -> PipelineResult<()> {
        let payload = serde_json::to_value(envelope)?;
        self.queue
            .enqueue(
                envelope.stage.as_str(),
                payload,
                envelope.stage.priority().value(),
                stage_max_attempts(&self.config, envelope.stage),
                None,
            )
            .await?;
        Ok(())
    }
}
