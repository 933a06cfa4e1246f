//! Mock implementation of `VectorStorage` for testing
//!
//! In-memory backend that enforces the same collection-dimension rules as
//! the real Qdrant backend, so pipeline tests catch dimension bugs without
//! a running vector database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docuvec_common::CorrelationId;
use uuid::Uuid;

use crate::error::{VectorDataError, VectorDataResult};
use crate::storage::traits::{ChunkPoint, VectorSearchResult, VectorStorage};

#[derive(Debug, Default)]
struct MockCollection {
    dim: usize,
    points: HashMap<Uuid, ChunkPoint>,
}

type Collections = Arc<Mutex<HashMap<String, MockCollection>>>;

#[derive(Clone, Default)]
pub struct MockStorage {
    collections: Collections,
    fail_on_upsert: bool,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure to fail on upsert operations (for testing error handling)
    pub fn with_upsert_failure(mut self) -> Self {
        self.fail_on_upsert = true;
        self
    }

    /// Point count across all collections (for test assertions)
    pub fn point_count(&self) -> usize {
        self.lock().values().map(|c| c.points.len()).sum()
    }

    /// Points stored in one collection, ordered by chunk index
    pub fn points_in(&self, collection: &str) -> Vec<ChunkPoint> {
        let guard = self.lock();
        let mut points: Vec<ChunkPoint> = guard
            .get(collection)
            .map(|c| c.points.values().cloned().collect())
            .unwrap_or_default();
        points.sort_by_key(|p| p.chunk_idx);
        points
    }

    pub fn collection_dim(&self, collection: &str) -> Option<usize> {
        self.lock().get(collection).map(|c| c.dim)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MockCollection>> {
        self.collections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStorage for MockStorage {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> VectorDataResult<()> {
        let mut guard = self.lock();
        if let Some(existing) = guard.get(collection) {
            if existing.dim != dim {
                return Err(VectorDataError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: existing.dim,
                    actual: dim,
                });
            }
            return Ok(());
        }
        guard.insert(
            collection.to_string(),
            MockCollection {
                dim,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> VectorDataResult<bool> {
        Ok(self.lock().contains_key(collection))
    }

    async fn drop_collection(&self, collection: &str) -> VectorDataResult<bool> {
        Ok(self.lock().remove(collection).is_some())
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: &[ChunkPoint],
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<usize> {
        if self.fail_on_upsert {
            return Err(VectorDataError::Storage("mock upsert failure".to_string()));
        }
        let Some(first) = points.first() else {
            return Ok(0);
        };
        self.ensure_collection(collection, first.vector.len()).await?;

        let mut guard = self.lock();
        let entry = guard
            .get_mut(collection)
            .ok_or_else(|| VectorDataError::Collection(collection.to_string()))?;
        for point in points {
            if point.vector.len() != entry.dim {
                return Err(VectorDataError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: entry.dim,
                    actual: point.vector.len(),
                });
            }
            entry.points.insert(point.id, point.clone());
        }
        Ok(points.len())
    }

    async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        limit: usize,
        document_id: Option<Uuid>,
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<Vec<VectorSearchResult>> {
        let guard = self.lock();
        let Some(entry) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        if query.len() != entry.dim {
            return Err(VectorDataError::DimensionMismatch {
                collection: collection.to_string(),
                expected: entry.dim,
                actual: query.len(),
            });
        }
        let mut hits: Vec<VectorSearchResult> = entry
            .points
            .values()
            .filter(|p| document_id.is_none_or(|d| p.document_id == d))
            .map(|p| VectorSearchResult {
                id: p.id,
                document_id: p.document_id,
                chunk_idx: p.chunk_idx,
                text: p.text.clone(),
                tags: p.tags.clone(),
                similarity: cosine(&query, &p.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_points(&self, collection: &str, point_ids: &[Uuid]) -> VectorDataResult<()> {
        if let Some(entry) = self.lock().get_mut(collection) {
            for id in point_ids {
                entry.points.remove(id);
            }
        }
        Ok(())
    }

    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: Uuid,
        _correlation_id: &CorrelationId,
    ) -> VectorDataResult<()> {
        if let Some(entry) = self.lock().get_mut(collection) {
            entry.points.retain(|_, p| p.document_id != document_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(document_id: Uuid, chunk_idx: usize, vector: Vec<f32>) -> ChunkPoint {
        ChunkPoint {
            id: Uuid::new_v4(),
            vector,
            document_id,
            chunk_idx,
            text: format!("chunk {chunk_idx}"),
            tags: vec!["test".to_string()],
        }
    }

    #[tokio::test]
    async fn lazy_collection_takes_first_observed_dim() {
        let storage = MockStorage::new();
        let cid = CorrelationId::new();
        let doc = Uuid::new_v4();
        storage
            .upsert_points("minilm_384", &[point(doc, 0, vec![0.1; 384])], &cid)
            .await
            .unwrap();
        assert_eq!(storage.collection_dim("minilm_384"), Some(384));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let storage = MockStorage::new();
        let cid = CorrelationId::new();
        let doc = Uuid::new_v4();
        storage
            .upsert_points("minilm_384", &[point(doc, 0, vec![0.1; 384])], &cid)
            .await
            .unwrap();
        let err = storage
            .upsert_points("minilm_384", &[point(doc, 1, vec![0.1; 768])], &cid)
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDataError::DimensionMismatch { expected: 384, actual: 768, .. }));
    }

    #[tokio::test]
    async fn search_can_filter_by_document() {
        let storage = MockStorage::new();
        let cid = CorrelationId::new();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        storage
            .upsert_points(
                "minilm_4",
                &[
                    point(doc_a, 0, vec![1.0, 0.0, 0.0, 0.0]),
                    point(doc_b, 0, vec![0.0, 1.0, 0.0, 0.0]),
                ],
                &cid,
            )
            .await
            .unwrap();
        let hits = storage
            .search("minilm_4", vec![1.0, 0.0, 0.0, 0.0], 10, Some(doc_b), &cid)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, doc_b);
    }

    #[tokio::test]
    async fn delete_by_document_removes_only_that_document() {
        let storage = MockStorage::new();
        let cid = CorrelationId::new();
        let doc_a = Uuid::new_v4();
        let doc_b = Uuid::new_v4();
        storage
            .upsert_points(
                "minilm_4",
                &[
                    point(doc_a, 0, vec![1.0, 0.0, 0.0, 0.0]),
                    point(doc_a, 1, vec![0.5, 0.5, 0.0, 0.0]),
                    point(doc_b, 0, vec![0.0, 1.0, 0.0, 0.0]),
                ],
                &cid,
            )
            .await
            .unwrap();
        storage.delete_by_document("minilm_4", doc_a, &cid).await.unwrap();
        assert_eq!(storage.point_count(), 1);
        assert_eq!(storage.points_in("minilm_4")[0].document_id, doc_b);
    }
}
