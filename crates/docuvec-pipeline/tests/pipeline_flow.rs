//! End-to-end pipeline tests over in-memory backends
//!
//! Drives uploads through every stage by stepping the worker one task
//! at a time, then asserts on document status, chunk rows, vector
//! points, and staged artifacts.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use docuvec_common::CorrelationId;
use docuvec_config::{EmbeddingConfig, ModelSpec, PipelineConfig, Profile};
use docuvec_embeddings::{
    EmbeddingDispatcher, EmbeddingPool, EmbeddingProvider, MockProvider, ModelRegistry,
};
use docuvec_meta_data::{DocumentRepository, DocumentStatus, MockRepository, TaskQueue};
use docuvec_object_store::{MemoryObjectStore, ObjectStore, canonical_key, vector_artifact_key};
use docuvec_parsing::AdaptiveChunker;
use docuvec_pipeline::{
    ChunkInput, ChunkStage, DeleteStage, DocumentService, EmbedStage, IndexStage,
    InMemoryTaskQueue, NormalizeStage, PipelineWorker, StageError, StageKind, StageRunner,
    TaskEnvelope,
};
use docuvec_vector_data::{MockStorage, collection_name};
use uuid::Uuid;

fn embedding_config() -> EmbeddingConfig {
    let mut config = EmbeddingConfig::from_env();
    config.models = vec![
        ModelSpec::with_default_queues("minilm", "minilm-l6", 8, 512, "http://localhost:8080"),
        ModelSpec::with_default_queues("bge", "bge-large-en", 16, 512, "http://localhost:8081"),
    ];
    config.default_models = HashMap::from([
        (Profile::Rt, vec!["minilm".to_string()]),
        (Profile::Bulk, vec!["minilm".to_string(), "bge".to_string()]),
    ]);
    config
}

fn pipeline_config() -> PipelineConfig {
    let mut config = PipelineConfig::from_env();
    // Immediate retries so tests can drain the queue synchronously
    config.backoff_base_ms = 0;
    config
}

struct Harness {
    repository: Arc<MockRepository>,
    store: Arc<MemoryObjectStore>,
    vectors: Arc<MockStorage>,
    queue: Arc<InMemoryTaskQueue>,
    service: DocumentService,
    worker: PipelineWorker,
}

fn harness() -> Harness {
    // Surface stage logs when RUST_LOG is set; ignore double-init
    static TRACING: std::sync::Once = std::sync::Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });

    let embedding = embedding_config();
    let pipeline = pipeline_config();

    let repository = Arc::new(MockRepository::new());
    let store = Arc::new(MemoryObjectStore::new("docuvec-test"));
    let vectors = Arc::new(MockStorage::new());
    let queue = Arc::new(InMemoryTaskQueue::new());

    let registry = ModelRegistry::from_config(&embedding);
    let providers = HashMap::from([
        (
            "minilm".to_string(),
            Arc::new(MockProvider::new("minilm-l6", 8)) as Arc<dyn EmbeddingProvider>,
        ),
        (
            "bge".to_string(),
            Arc::new(MockProvider::new("bge-large-en", 16)) as Arc<dyn EmbeddingProvider>,
        ),
    ]);
    let pool = EmbeddingPool::new(&registry, providers, &embedding);
    let dispatcher = Arc::new(EmbeddingDispatcher::new(
        Arc::clone(&registry),
        pool,
        &embedding,
    ));

    let repo_dyn: Arc<dyn DocumentRepository> = Arc::clone(&repository) as _;
    let store_dyn: Arc<dyn ObjectStore> = Arc::clone(&store) as _;
    let vectors_dyn: Arc<dyn docuvec_vector_data::VectorStorage> = Arc::clone(&vectors) as _;
    let queue_dyn: Arc<dyn TaskQueue> = Arc::clone(&queue) as _;

    let chunker = AdaptiveChunker::new(1200, 100).expect("valid chunker config");
    let stages = Arc::new(StageRunner {
        normalize: NormalizeStage::new(Arc::clone(&repo_dyn), Arc::clone(&store_dyn)),
        chunk: ChunkStage::new(
            Arc::clone(&repo_dyn),
            Arc::clone(&store_dyn),
            Arc::clone(&vectors_dyn),
            Arc::clone(&registry),
            chunker,
        ),
        embed: EmbedStage::new(
            Arc::clone(&repo_dyn),
            Arc::clone(&store_dyn),
            dispatcher,
            Arc::clone(&registry),
        ),
        index: IndexStage::new(
            Arc::clone(&repo_dyn),
            Arc::clone(&store_dyn),
            Arc::clone(&vectors_dyn),
        ),
        delete: DeleteStage::new(
            Arc::clone(&repo_dyn),
            Arc::clone(&store_dyn),
            Arc::clone(&vectors_dyn),
            Arc::clone(&registry),
        ),
    });

    let service = DocumentService::new(
        Arc::clone(&repo_dyn),
        Arc::clone(&store_dyn),
        Arc::clone(&queue_dyn),
        pipeline.clone(),
    );
    let worker = PipelineWorker::new(queue_dyn, repo_dyn, stages, pipeline);

    Harness {
        repository,
        store,
        vectors,
        queue,
        service,
        worker,
    }
}

/// Step the worker until the queue is empty
async fn drain(worker: &PipelineWorker) {
    for _ in 0..64 {
        let processed = worker
            .process_one("test-worker")
            .await
            .expect("task handling should not error");
        if processed.is_none() {
            return;
        }
    }
    panic!("queue did not drain within 64 steps");
}

fn multi_page_text() -> String {
    let mut text = String::new();
    for section in 1..=3 {
        text.push_str(&format!("# Section {section}\n\n"));
        for paragraph in 0..12 {
            text.push_str(&format!(
                "Paragraph {paragraph} of section {section}. Document ingestion \
                 turns uploads into canonical text, splits it into retrieval-sized \
                 chunks, and embeds every chunk with each configured model.\n\n"
            ));
        }
    }
    text
}

#[tokio::test]
async fn upload_flows_to_ready_with_indexed_chunks() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let document = h
        .service
        .upload(
            tenant,
            "report.txt",
            Bytes::from(multi_page_text()),
            vec!["quarterly".to_string()],
        )
        .await
        .expect("upload accepted");

    drain(&h.worker).await;

    assert_eq!(h.repository.status_of(document.id), Some(DocumentStatus::Ready));

    let chunks = h.repository.list_chunks(document.id).await.unwrap();
    assert!(chunks.len() > 1, "long text should split into several chunks");
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_idx, i32::try_from(i).unwrap());
        assert_eq!(chunk.embedding_model.as_deref(), Some("minilm"));
        assert_eq!(chunk.embedding_version.as_deref(), Some("minilm-l6"));
        assert!(chunk.vector_point_id.is_some());
    }

    // One point per chunk in each embedding space
    assert_eq!(h.vectors.points_in(&collection_name("minilm", 8)).len(), chunks.len());
    assert_eq!(h.vectors.points_in(&collection_name("bge", 16)).len(), chunks.len());
    assert_eq!(h.vectors.collection_dim(&collection_name("minilm", 8)), Some(8));

    // Canonical artifact stays, vector artifacts are cleaned up
    assert!(h.store.exists(&canonical_key(document.id)).await.unwrap());
    assert!(!h.store.exists(&vector_artifact_key(document.id, "minilm")).await.unwrap());
    assert!(!h.store.exists(&vector_artifact_key(document.id, "bge")).await.unwrap());
}

#[tokio::test]
async fn chunk_before_canonical_exists_is_retryable() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let document = h
        .service
        .upload(tenant, "early.txt", Bytes::from_static(b"hello"), vec![])
        .await
        .unwrap();
    let cid = CorrelationId::new();
    h.repository
        .transition_status(document.id, DocumentStatus::Uploaded, DocumentStatus::Normalizing, &cid)
        .await
        .unwrap();
    h.repository
        .transition_status(document.id, DocumentStatus::Normalizing, DocumentStatus::Chunking, &cid)
        .await
        .unwrap();

    // Canonical blob was never written, so the stage cannot make progress
    let envelope = TaskEnvelope::new(
        cid,
        tenant,
        document.id,
        StageKind::Chunk,
        serde_json::to_value(ChunkInput {
            canonical_key: canonical_key(document.id),
        })
        .unwrap(),
    );
    let err = h.worker_chunk_stage_error(&envelope).await;
    assert!(matches!(err, StageError::Retryable(_)));
    assert_eq!(h.repository.status_of(document.id), Some(DocumentStatus::Chunking));
}

impl Harness {
    /// Run the chunk stage directly and return the expected error
    async fn worker_chunk_stage_error(&self, envelope: &TaskEnvelope) -> StageError {
        // Rebuild a chunk stage over the same backends; stages are cheap
        let chunker = AdaptiveChunker::new(1200, 100).unwrap();
        let embedding = embedding_config();
        let registry = ModelRegistry::from_config(&embedding);
        let stage = ChunkStage::new(
            Arc::clone(&self.repository) as _,
            Arc::clone(&self.store) as _,
            Arc::clone(&self.vectors) as _,
            registry,
            chunker,
        );
        stage
            .run(envelope)
            .await
            .expect_err("chunk without canonical must fail")
    }
}

#[tokio::test]
async fn stale_task_after_completion_is_a_noop() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let document = h
        .service
        .upload(tenant, "note.txt", Bytes::from(multi_page_text()), vec![])
        .await
        .unwrap();
    drain(&h.worker).await;
    assert_eq!(h.repository.status_of(document.id), Some(DocumentStatus::Ready));

    // Redeliver the normalize task for the already-finished document
    let stale = TaskEnvelope::new(
        CorrelationId::new(),
        tenant,
        document.id,
        StageKind::Normalize,
        serde_json::json!({
            "source_key": document.source_key,
            "filename": "note.txt",
        }),
    );
    h.queue
        .enqueue(
            stale.stage.as_str(),
            serde_json::to_value(&stale).unwrap(),
            stale.stage.priority().value(),
            5,
            None,
        )
        .await
        .unwrap();
    drain(&h.worker).await;

    // Quietly acked, document untouched
    assert_eq!(h.repository.status_of(document.id), Some(DocumentStatus::Ready));
}

#[tokio::test]
async fn delete_cascades_chunks_points_and_blobs() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let document = h
        .service
        .upload(tenant, "gone.txt", Bytes::from(multi_page_text()), vec![])
        .await
        .unwrap();
    drain(&h.worker).await;
    assert!(h.vectors.point_count() > 0);

    h.service.delete(document.id).await.unwrap();
    drain(&h.worker).await;

    assert!(h.repository.get_document(document.id).await.unwrap().is_none());
    assert_eq!(h.vectors.point_count(), 0);
    assert_eq!(h.store.object_count(), 0);
}

#[tokio::test]
async fn reanalyze_replaces_the_chunk_generation_without_duplicates() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let document = h
        .service
        .upload(tenant, "redo.txt", Bytes::from(multi_page_text()), vec![])
        .await
        .unwrap();
    drain(&h.worker).await;
    let first_points = h.vectors.points_in(&collection_name("minilm", 8)).len();
    assert!(first_points > 0);

    let generation = h.service.reanalyze(document.id).await.unwrap();
    assert_eq!(generation, 1);
    drain(&h.worker).await;

    assert_eq!(h.repository.status_of(document.id), Some(DocumentStatus::Ready));
    let chunks = h.repository.list_chunks(document.id).await.unwrap();
    assert!(chunks.iter().all(|c| c.generation == 1));
    // Superseded points were purged, not accumulated
    assert_eq!(
        h.vectors.points_in(&collection_name("minilm", 8)).len(),
        chunks.len()
    );
}

#[tokio::test]
async fn unparseable_payload_is_dropped_not_redelivered() {
    let h = harness();
    h.queue
        .enqueue("normalize", serde_json::json!({"not": "an envelope"}), 1, 5, None)
        .await
        .unwrap();

    let first = h.worker.process_one("test-worker").await.unwrap();
    assert!(first.is_some(), "poison task should be claimed once");
    let second = h.worker.process_one("test-worker").await.unwrap();
    assert!(second.is_none(), "poison task must not come back");
}

#[tokio::test]
async fn fatal_extraction_marks_the_document_error() {
    let h = harness();
    let tenant = Uuid::new_v4();
    // Whitespace-only upload: extraction succeeds but yields no content
    let document = h
        .service
        .upload(tenant, "blank.txt", Bytes::from_static(b"   \n\t  \n"), vec![])
        .await
        .unwrap();
    drain(&h.worker).await;

    assert_eq!(h.repository.status_of(document.id), Some(DocumentStatus::Error));
}
