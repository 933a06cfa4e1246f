//! Docuvec pipeline worker daemon
//!
//! Connects to Postgres and Qdrant, wires one HTTP embedding provider per
//! registered model, and drains the task queue until interrupted.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use docuvec_config::ApplicationConfig;
use docuvec_config::validation::Validate;
use docuvec_embeddings::{EmbeddingDispatcher, EmbeddingPool, ModelRegistry};
use docuvec_meta_data::{
    DocumentRepository, PgDocumentRepository, PostgresTaskQueue, TaskQueue, connect_and_migrate,
};
use docuvec_object_store::{MemoryObjectStore, ObjectStore};
use docuvec_parsing::AdaptiveChunker;
use docuvec_pipeline::{
    ChunkStage, DeleteStage, EmbedStage, IndexStage, NormalizeStage, PipelineWorker, StageRunner,
};
use docuvec_vector_data::{QdrantStorage, VectorStorage};
use tracing::info;

type MainResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> MainResult {
    // Load .env before any from_env() config reads
    docuvec_common::initialize_environment();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Docuvec pipeline worker...");

    let config = ApplicationConfig::from_env();
    config.validate()?;
    info!(database = %config.database.safe_connection_string(), "Configuration loaded");

    let pool = connect_and_migrate(&config.database).await?;
    let repository: Arc<dyn DocumentRepository> =
        Arc::new(PgDocumentRepository::new(pool.clone()));
    let queue: Arc<dyn TaskQueue> = Arc::new(PostgresTaskQueue::new(pool));
    // Single-process blob store backing the configured bucket
    let store: Arc<dyn ObjectStore> =
        Arc::new(MemoryObjectStore::new(&config.object_store.bucket));
    let vectors: Arc<dyn VectorStorage> = Arc::new(QdrantStorage::new(&config.vector_storage.url)?);

    let registry = ModelRegistry::from_config(&config.embedding);
    let embed_pool = EmbeddingPool::with_http_providers(&registry, &config.embedding);
    let dispatcher = Arc::new(EmbeddingDispatcher::new(
        Arc::clone(&registry),
        embed_pool,
        &config.embedding,
    ));
    let chunker = AdaptiveChunker::from_config(&config.chunking)?;

    let stages = Arc::new(StageRunner {
        normalize: NormalizeStage::new(Arc::clone(&repository), Arc::clone(&store)),
        chunk: ChunkStage::new(
            Arc::clone(&repository),
            Arc::clone(&store),
            Arc::clone(&vectors),
            Arc::clone(&registry),
            chunker,
        ),
        embed: EmbedStage::new(
            Arc::clone(&repository),
            Arc::clone(&store),
            dispatcher,
            Arc::clone(&registry),
        ),
        index: IndexStage::new(
            Arc::clone(&repository),
            Arc::clone(&store),
            Arc::clone(&vectors),
        ),
        delete: DeleteStage::new(Arc::clone(&repository), store, vectors, registry),
    });

    let worker = PipelineWorker::new(queue, repository, stages, config.pipeline.clone());
    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    worker.run().await;
    Ok(())
}
