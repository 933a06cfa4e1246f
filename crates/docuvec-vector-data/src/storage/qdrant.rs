//! Qdrant vector index backend.
//!
//! One Qdrant collection per embedding space, created lazily and sized to
//! the first vector dimension observed for that space. Points carry the
//! chunk payload so search results need no enrichment query.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Context;
use async_trait::async_trait;
use docuvec_common::CorrelationId;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CollectionExistsRequest, Condition, CreateCollection, DeleteCollection, DeletePoints,
    Distance, Filter, PointId, PointStruct, PointsIdsList, PointsSelector, SearchPoints, Value,
    VectorParams, points_selector::PointsSelectorOneOf,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::error::{VectorDataError, VectorDataResult};
use crate::storage::traits::{ChunkPoint, VectorSearchResult, VectorStorage};

pub struct QdrantStorage {
    client: Qdrant,
    // Dimensions of collections this process has ensured, for early
    // mismatch detection before a round trip to the backend.
    known_dims: RwLock<HashMap<String, usize>>,
}

impl QdrantStorage {
    /// Connect to a Qdrant server. `QDRANT_API_KEY` is picked up from the
    /// environment when set.
    pub fn new(url: &str) -> VectorDataResult<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
            builder = builder.api_key(api_key);
        }
        let client = builder.build().map_err(|e| {
            VectorDataError::Storage(format!("Failed to create Qdrant client: {e}"))
        })?;
        Ok(Self {
            client,
            known_dims: RwLock::new(HashMap::new()),
        })
    }

    fn check_known_dim(&self, collection: &str, dim: usize) -> VectorDataResult<()> {
        let known = self
            .known_dims
            .read()
            .map_err(|_| VectorDataError::Other("dimension cache poisoned".to_string()))?;
        match known.get(collection) {
            Some(&expected) if expected != dim => Err(VectorDataError::DimensionMismatch {
                collection: collection.to_string(),
                expected,
                actual: dim,
            }),
            _ => Ok(()),
        }
    }

    fn remember_dim(&self, collection: &str, dim: usize) -> VectorDataResult<()> {
        self.known_dims
            .write()
            .map_err(|_| VectorDataError::Other("dimension cache poisoned".to_string()))?
            .insert(collection.to_string(), dim);
        Ok(())
    }

    fn forget_dim(&self, collection: &str) -> VectorDataResult<()> {
        self.known_dims
            .write()
            .map_err(|_| VectorDataError::Other("dimension cache poisoned".to_string()))?
            .remove(collection);
        Ok(())
    }
}

fn document_filter(document_id: Uuid) -> Filter {
    Filter::must([Condition::matches(
        "document_id",
        document_id.to_string(),
    )])
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn payload_tags(payload: &HashMap<String, Value>) -> Vec<String> {
    match payload.get("tags").and_then(|v| v.kind.as_ref()) {
        Some(Kind::ListValue(list)) => list
            .values
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl VectorStorage for QdrantStorage {
    #[tracing::instrument(skip(self))]
    async fn ensure_collection(&self, collection: &str, dim: usize) -> VectorDataResult<()> {
        self.check_known_dim(collection, dim)?;
        if self.collection_exists(collection).await? {
            self.remember_dim(collection, dim)?;
            return Ok(());
        }

        let request = CreateCollection {
            collection_name: collection.to_string(),
            vectors_config: Some(
                VectorParams {
                    size: dim as u64,
                    distance: Distance::Cosine as i32,
                    ..Default::default()
                }
                .into(),
            ),
            ..Default::default()
        };

        match self.client.create_collection(request).await {
            Ok(_) => {
                self.remember_dim(collection, dim)?;
                Ok(())
            }
            Err(e) => {
                // Another worker may have created it between the exists
                // check and now
                if e.to_string().contains("already exists") {
                    self.remember_dim(collection, dim)?;
                    Ok(())
                } else {
                    Err(VectorDataError::Collection(format!(
                        "Failed to create collection '{collection}': {e}"
                    )))
                }
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn collection_exists(&self, collection: &str) -> VectorDataResult<bool> {
        let request = CollectionExistsRequest {
            collection_name: collection.to_string(),
        };
        self.client.collection_exists(request).await.map_err(|e| {
            VectorDataError::Storage(format!("Failed to check collection exists: {e}"))
        })
    }

    async fn drop_collection(&self, collection: &str) -> VectorDataResult<bool> {
        if !self.collection_exists(collection).await? {
            return Ok(false);
        }
        let request = DeleteCollection {
            collection_name: collection.to_string(),
            ..Default::default()
        };
        self.client.delete_collection(request).await.map_err(|e| {
            VectorDataError::Collection(format!("Failed to drop collection '{collection}': {e}"))
        })?;
        self.forget_dim(collection)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, points), fields(point_count = points.len()))]
    async fn upsert_points(
        &self,
        collection: &str,
        points: &[ChunkPoint],
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<usize> {
        let Some(first) = points.first() else {
            return Ok(0);
        };
        let dim = first.vector.len();
        for point in points {
            if point.vector.len() != dim {
                return Err(VectorDataError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: dim,
                    actual: point.vector.len(),
                });
            }
        }
        self.ensure_collection(collection, dim).await?;

        tracing::info!(
            correlation_id = %correlation_id,
            collection = %collection,
            point_count = points.len(),
            dim = %dim,
            "Upserting chunk points"
        );

        let qdrant_points: Vec<PointStruct> = points
            .iter()
            .map(|point| {
                let mut payload = HashMap::new();
                payload.insert(
                    "document_id".to_string(),
                    Value::from(point.document_id.to_string()),
                );
                payload.insert("chunk_idx".to_string(), Value::from(point.chunk_idx as i64));
                payload.insert("text".to_string(), Value::from(point.text.clone()));
                payload.insert(
                    "tags".to_string(),
                    Value::from(
                        point
                            .tags
                            .iter()
                            .map(|t| Value::from(t.clone()))
                            .collect::<Vec<Value>>(),
                    ),
                );
                PointStruct::new(
                    point.id.to_string(),
                    point.vector.clone(),
                    Payload::from(payload),
                )
            })
            .collect();

        let count = qdrant_points.len();
        let request = qdrant_client::qdrant::UpsertPoints {
            collection_name: collection.to_string(),
            points: qdrant_points,
            ..Default::default()
        };
        self.client
            .upsert_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Failed to upsert points: {e}")))?;
        Ok(count)
    }

    #[tracing::instrument(skip(self, query), fields(query_dim = query.len(), limit))]
    async fn search(
        &self,
        collection: &str,
        query: Vec<f32>,
        limit: usize,
        document_id: Option<Uuid>,
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<Vec<VectorSearchResult>> {
        tracing::info!(
            correlation_id = %correlation_id,
            collection = %collection,
            query_dim = query.len(),
            limit = %limit,
            "Performing vector search"
        );

        let request = SearchPoints {
            collection_name: collection.to_string(),
            vector: query,
            limit: limit as u64,
            with_payload: Some(true.into()),
            filter: document_id.map(document_filter),
            ..Default::default()
        };

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Search failed: {e}")))?;

        let mut results = Vec::new();
        for scored in response.result {
            let payload = &scored.payload;
            let id = scored
                .id
                .as_ref()
                .and_then(|pid| match &pid.point_id_options {
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => {
                        Uuid::parse_str(s).ok()
                    }
                    _ => None,
                })
                .unwrap_or_default();
            results.push(VectorSearchResult {
                id,
                document_id: Uuid::parse_str(&payload_str(payload, "document_id"))
                    .unwrap_or_default(),
                chunk_idx: payload
                    .get("chunk_idx")
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0) as usize,
                text: payload_str(payload, "text"),
                tags: payload_tags(payload),
                similarity: scored.score,
            });
        }
        Ok(results)
    }

    async fn delete_points(&self, collection: &str, point_ids: &[Uuid]) -> VectorDataResult<()> {
        if point_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<PointId> = point_ids
            .iter()
            .map(|id| PointId::from(id.to_string()))
            .collect();
        let request = DeletePoints {
            collection_name: collection.to_string(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList {
                    ids,
                })),
            }),
            ..Default::default()
        };
        self.client
            .delete_points(request)
            .await
            .context("Failed to delete points from Qdrant")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_by_document(
        &self,
        collection: &str,
        document_id: Uuid,
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<()> {
        tracing::info!(
            correlation_id = %correlation_id,
            collection = %collection,
            document_id = %document_id,
            "Deleting all points for document"
        );
        let request = DeletePoints {
            collection_name: collection.to_string(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Filter(document_filter(
                    document_id,
                ))),
            }),
            ..Default::default()
        };
        self.client
            .delete_points(request)
            .await
            .context("Failed to delete document points from Qdrant")?;
        Ok(())
    }
}
