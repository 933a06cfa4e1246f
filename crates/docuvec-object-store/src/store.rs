//! Storage gateway trait. Backends are object stores keyed by string
//! paths inside a single configured bucket.

use std::time::Duration;

use bytes::Bytes;

use crate::error::StorageResult;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing value at `key`.
    async fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()>;

    /// Read an object. Missing keys are `StorageError::NotFound`.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Delete every object under `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<usize>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Produce a time-limited URL for direct download of an existing object.
    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String>;
}
