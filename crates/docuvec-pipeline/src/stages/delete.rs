//! Delete stage: cascade a tombstoned document out of every store

use std::sync::Arc;

use docuvec_embeddings::ModelRegistry;
use docuvec_meta_data::DocumentRepository;
use docuvec_object_store::{ObjectStore, document_prefix};
use docuvec_vector_data::{VectorStorage, collection_name};
use tracing::info;

use crate::envelope::TaskEnvelope;
use crate::error::StageError;

pub struct DeleteStage {
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn ObjectStore>,
    vectors: Arc<dyn VectorStorage>,
    registry: Arc<ModelRegistry>,
}

impl DeleteStage {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        store: Arc<dyn ObjectStore>,
        vectors: Arc<dyn VectorStorage>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            repository,
            store,
            vectors,
            registry,
        }
    }

    #[tracing::instrument(
        skip(self, envelope),
        fields(correlation_id = %envelope.correlation_id, document_id = %envelope.document_id)
    )]
    pub async fn run(&self, envelope: &TaskEnvelope) -> Result<Option<TaskEnvelope>, StageError> {
        let id = envelope.document_id;

        if self.repository.get_document(id).await?.is_none() {
            tracing::debug!("Document already removed, delete is a no-op");
            return Ok(None);
        }

        let point_ids = self
            .repository
            .delete_document(id, &envelope.correlation_id)
            .await?;

        // Payload-filter delete covers every generation, including points
        // whose chunk rows were already superseded
        for spec in self.registry.list_models() {
            let collection = collection_name(&spec.alias, spec.dim);
            if self.vectors.collection_exists(&collection).await? {
                self.vectors
                    .delete_by_document(&collection, id, &envelope.correlation_id)
                    .await?;
            }
        }

        let blobs = self.store.delete_prefix(&document_prefix(id)).await?;

        info!(
            chunk_points = point_ids.len(),
            blobs_removed = blobs,
            "Deleted document with full cascade"
        );
        Ok(None)
    }
}
