//! In-memory object store for tests and local development.

use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: DashMap<String, Bytes>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: DashMap::new(),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("docuvec-documents")
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        self.objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.remove(key);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        if prefix.is_empty() {
            return Err(StorageError::InvalidKey(
                "refusing to delete with empty prefix".to_string(),
            ));
        }
        let keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        let removed = keys.len();
        for key in keys {
            self.objects.remove(&key);
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.contains_key(key))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        if !self.objects.contains_key(key) {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            key,
            ttl.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryObjectStore::default();
        store.put("doc/canonical.json", Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(store.get("doc/canonical.json").await.unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryObjectStore::default();
        assert!(matches!(
            store.get("nope").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_prefix_removes_all_document_objects() {
        let store = MemoryObjectStore::default();
        store.put("d1/canonical.json", Bytes::new()).await.unwrap();
        store.put("d1/vectors/minilm.json", Bytes::new()).await.unwrap();
        store.put("d2/canonical.json", Bytes::new()).await.unwrap();
        let removed = store.delete_prefix("d1/").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.object_count(), 1);
    }

    #[tokio::test]
    async fn presign_embeds_bucket_and_ttl() {
        let store = MemoryObjectStore::new("uploads");
        store.put("d1/source/a.txt", Bytes::new()).await.unwrap();
        let url = store
            .presign("d1/source/a.txt", Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(url, "memory://uploads/d1/source/a.txt?expires=900");
    }
}
