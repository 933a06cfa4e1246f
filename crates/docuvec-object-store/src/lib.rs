//! Docuvec object storage crate
//!
//! Storage gateway for uploaded sources, canonical document artifacts,
//! and per-model vector artifacts, plus the key layout they share.

pub mod error;
pub mod keys;
pub mod memory;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use keys::{canonical_key, document_prefix, source_key, vector_artifact_key};
pub use memory::MemoryObjectStore;
pub use store::ObjectStore;
