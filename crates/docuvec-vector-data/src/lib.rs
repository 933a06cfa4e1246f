//! Docuvec vector data storage crate
//!
//! Vector index operations for chunk embeddings: one collection per
//! embedding space, lazily created and sized to the first observed
//! vector dimension. Backends: Qdrant, plus an in-memory mock for tests.

pub mod error;
pub mod storage;

pub use error::{VectorDataError, VectorDataResult};
pub use storage::{
    ChunkPoint, MockStorage, QdrantStorage, VectorSearchResult, VectorStorage, collection_name,
};
