//! Document and chunk metadata for `DocuVec`
//!
//! `PostgreSQL` is the source of truth for document state: the lifecycle
//! state machine, chunk records with embedding provenance, and the
//! priority task queue that drives the pipeline. Vector payloads live in
//! Qdrant; this crate only tracks the point ids that tie the two
//! together.

pub mod error;
pub mod mock;
pub mod models;
pub mod point_id;
pub mod repository;
pub mod task_queue;
pub mod traits;

pub use error::{DatabaseError, DatabaseResult};
pub use mock::MockRepository;
pub use models::{Chunk, Document, DocumentStatus, NewChunk};
pub use point_id::generate_point_id;
pub use repository::PgDocumentRepository;
pub use task_queue::{NackOutcome, PostgresTaskQueue, QueueDepth, QueuedTask, TaskQueue};
pub use traits::DocumentRepository;

use std::time::Duration;

use docuvec_config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;

/// Connect a pool from configuration and run pending migrations
pub async fn connect_and_migrate(config: &DatabaseConfig) -> DatabaseResult<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.timeout_seconds))
        .connect_with(config.connect_options())
        .await
        .map_err(|source| DatabaseError::Query {
            operation: "connect".to_string(),
            source,
        })?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DatabaseError::Other(e.to_string()))?;
    Ok(pool)
}
