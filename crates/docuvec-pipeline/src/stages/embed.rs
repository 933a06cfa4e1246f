//! Embed stage: pending chunk texts to per-model vector artifacts

use std::sync::Arc;

use bytes::Bytes;
use docuvec_common::ErrorContext;
use docuvec_config::Profile;
use docuvec_embeddings::{EmbeddingDispatcher, EmbeddingRequest, ModelRegistry};
use docuvec_meta_data::{DocumentRepository, DocumentStatus};
use docuvec_object_store::{ObjectStore, vector_artifact_key};
use tracing::{info, warn};

use crate::envelope::{
    ArtifactRef, ChunkVector, IndexInput, StageKind, TaskEnvelope, VectorArtifact,
};
use crate::error::StageError;
use crate::stages::{PreconditionMiss, classify_miss};

pub struct EmbedStage {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ObjectStore>,
    dispatcher: Arc<EmbeddingDispatcher>,
    registry: Arc<ModelRegistry>,
}

impl EmbedStage {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        store: Arc<dyn ObjectStore>,
        dispatcher: Arc<EmbeddingDispatcher>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            repository,
            store,
            dispatcher,
            registry,
        }
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(correlation_id = %envelope.correlation_id, document_id = %envelope.document_id)
    )]
    pub async fn run(&self, envelope: &TaskEnvelope) -> Result<Option<TaskEnvelope>, StageError> {
        let id = envelope.document_id;

        let Some(document) = self.repository.get_document(id).await? else {
            return Err(StageError::Retryable("document not visible yet".to_string()));
        };
        if document.status != DocumentStatus::Embedding {
            return match classify_miss(DocumentStatus::Embedding, Some(document.status)) {
                PreconditionMiss::Stale => {
                    tracing::warn!(status = %document.status, "Stale embed task, skipping");
                    Ok(None)
                }
                PreconditionMiss::Retry(err) => Err(err),
            };
        }

        // Resume-safe: only chunks still missing a vector point are sent
        let pending = self.repository.pending_chunks(id).await?;
        if pending.is_empty() {
            return self.advance(envelope, IndexInput::default()).await;
        }

        let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
        let request = EmbeddingRequest::new(envelope.tenant_id, texts, Profile::Bulk);
        let response = self.dispatcher.dispatch(request).await;

        for result in &response.results {
            for warning in &result.warnings {
                warn!(model = %result.model, "Embedding warning: {warning}");
            }
        }
        for error in &response.errors {
            warn!(
                model = %error.model,
                retryable = error.retryable,
                "Embedding model failed: {}",
                error.message
            );
        }
        if response.is_empty() {
            let detail = response
                .errors
                .first()
                .map_or_else(|| "no healthy target model".to_string(), |e| e.message.clone());
            return Err(StageError::Retryable(format!(
                "no embedding model produced vectors: {detail}"
            )));
        }

        let mut artifacts = Vec::with_capacity(response.results.len());
        for result in &response.results {
            let version = self
                .registry
                .get_model(&result.model)
                .map_or_else(|| result.model.clone(), |spec| spec.id.clone());
            let artifact = VectorArtifact {
                model: result.model.clone(),
                version: version.clone(),
                dim: result.dim,
                chunks: pending
                    .iter()
                    .zip(&result.vectors)
                    .map(|(chunk, vector)| ChunkVector {
                        chunk_id: chunk.id,
                        chunk_idx: chunk.chunk_idx,
                        vector: vector.clone(),
                    })
                    .collect(),
            };
            let key = vector_artifact_key(id, &result.model);
            let body = serde_json::to_vec(&artifact)
                .context("Artifact serialization failed")
                .map_err(StageError::Fatal)?;
            self.store.put(&key, Bytes::from(body)).await?;
            artifacts.push(ArtifactRef {
                model: result.model.clone(),
                version,
                dim: result.dim,
                key,
            });
        }

        info!(
            chunk_count = pending.len(),
            models = artifacts.len(),
            partial_failures = response.errors.len(),
            "Embedded document chunks"
        );
        self.advance(envelope, IndexInput { artifacts }).await
    }

    async fn advance(
        &self,
        envelope: &TaskEnvelope,
        input: IndexInput,
    ) -> Result<Option<TaskEnvelope>, StageError> {
        if !self
            .repository
            .transition_status(
                envelope.document_id,
                DocumentStatus::Embedding,
                DocumentStatus::Indexing,
                &envelope.correlation_id,
            )
            .await?
        {
            return Err(StageError::Retryable(
                "document left embedding state mid-stage".to_string(),
            ));
        }
        let payload =
            serde_json::to_value(input).map_err(|e| StageError::Fatal(e.to_string()))?;
        Ok(Some(envelope.follow_up(StageKind::Index, payload)))
    }
}
