// Copyright 2025 Cowboy AI, LLC.

//! Qdrant vector store binding
//!
//! Point ids are UUIDv5 digests of the chunk id, so upserts stay
//! idempotent; the full payload travels with every point. Declared
//! dimensions are tracked locally so dimension mismatches are refused
//! before anything reaches the server.

use crate::errors::{NodeError, NodeResult};
use crate::identifiers::ChunkId;
use crate::stores::vector::{CollectionSpec, VectorFilter, VectorHit, VectorPayload, VectorStore};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeletePointsBuilder, Distance, GetPointsBuilder, PointStruct,
    PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Qdrant connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Server URL, e.g. `http://localhost:6334`
    pub url: String,
    /// API key, when the server requires one
    pub api_key: Option<String>,
}

/// Vector store over a Qdrant server
pub struct QdrantVectorStore {
    client: Qdrant,
    dimensions: RwLock<HashMap<String, usize>>,
}

impl QdrantVectorStore {
    /// Connect to the server
    pub fn connect(config: QdrantConfig) -> NodeResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Some(key) = &config.api_key {
            builder = builder.api_key(key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;
        Ok(Self {
            client,
            dimensions: RwLock::new(HashMap::new()),
        })
    }

    fn point_id(chunk_id: &ChunkId) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_str().as_bytes()).to_string()
    }

    fn declared_dimension(&self, collection: &str) -> NodeResult<usize> {
        self.dimensions
            .read()
            .map_err(|_| NodeError::Internal("dimension registry lock poisoned".into()))?
            .get(collection)
            .copied()
            .ok_or_else(|| {
                NodeError::PreconditionViolated(format!(
                    "collection `{collection}` is not declared"
                ))
            })
    }

    fn check_dimension(&self, collection: &str, len: usize) -> NodeResult<()> {
        let declared = self.declared_dimension(collection)?;
        if len != declared {
            return Err(NodeError::PreconditionViolated(format!(
                "embedding dimension {len} does not match collection dimension {declared}"
            )));
        }
        Ok(())
    }

    fn payload_of(payload: &VectorPayload) -> NodeResult<Payload> {
        let value = serde_json::to_value(payload)?;
        Payload::try_from(value)
            .map_err(|e| NodeError::Internal(format!("payload conversion failed: {e}")))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, spec: CollectionSpec) -> NodeResult<()> {
        {
            let mut dimensions = self
                .dimensions
                .write()
                .map_err(|_| NodeError::Internal("dimension registry lock poisoned".into()))?;
            if let Some(existing) = dimensions.get(&spec.name) {
                if *existing != spec.dimension {
                    return Err(NodeError::PreconditionViolated(format!(
                        "collection `{}` already declared with dimension {existing}",
                        spec.name
                    )));
                }
                return Ok(());
            }
            dimensions.insert(spec.name.clone(), spec.dimension);
        }

        let exists = self
            .client
            .collection_exists(&spec.name)
            .await
            .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;
        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&spec.name).vectors_config(
                        VectorParamsBuilder::new(spec.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;
        }
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        vector: Vec<f32>,
        payload: VectorPayload,
    ) -> NodeResult<()> {
        self.check_dimension(collection, vector.len())?;
        let point = PointStruct::new(
            Self::point_id(&payload.chunk_id),
            vector,
            Self::payload_of(&payload)?,
        );
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, vec![point]).wait(true))
            .await
            .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, collection: &str, chunk_id: &ChunkId) -> NodeResult<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(collection)
                    .points(PointsIdsList {
                        ids: vec![Self::point_id(chunk_id).into()],
                    })
                    .wait(true),
            )
            .await
            .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: Option<VectorFilter>,
        min_similarity: Option<f32>,
    ) -> NodeResult<Vec<VectorHit>> {
        self.check_dimension(collection, vector.len())?;
        let mut builder =
            SearchPointsBuilder::new(collection, vector.to_vec(), k as u64).with_payload(true);
        if let Some(min) = min_similarity {
            builder = builder.score_threshold(min);
        }
        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;

        let mut hits = Vec::new();
        for scored in response.result {
            let payload_value = serde_json::to_value(&scored.payload)
                .map_err(|e| NodeError::Internal(e.to_string()))?;
            let payload: VectorPayload = serde_json::from_value(payload_value)
                .map_err(|e| NodeError::Internal(format!("stored payload unreadable: {e}")))?;
            if let Some(filter) = &filter {
                let document_ok = filter
                    .document_id
                    .as_ref()
                    .map_or(true, |d| &payload.document_id == d);
                let kind_ok = filter.kind.map_or(true, |k| payload.kind == k);
                if !document_ok || !kind_ok {
                    continue;
                }
            }
            hits.push(VectorHit {
                chunk_id: payload.chunk_id.clone(),
                score: scored.score,
                payload,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> NodeResult<usize> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;
        Ok(info
            .result
            .and_then(|r| r.points_count)
            .unwrap_or(0) as usize)
    }

    async fn get(
        &self,
        collection: &str,
        chunk_id: &ChunkId,
    ) -> NodeResult<Option<(Vec<f32>, VectorPayload)>> {
        let response = self
            .client
            .get_points(
                GetPointsBuilder::new(
                    collection,
                    vec![Self::point_id(chunk_id).into()],
                )
                .with_payload(true)
                .with_vectors(true),
            )
            .await
            .map_err(|e| NodeError::transient("qdrant", e.to_string()))?;

        let Some(point) = response.result.into_iter().next() else {
            return Ok(None);
        };
        let payload_value = serde_json::to_value(&point.payload)
            .map_err(|e| NodeError::Internal(e.to_string()))?;
        let payload: VectorPayload = serde_json::from_value(payload_value)
            .map_err(|e| NodeError::Internal(format!("stored payload unreadable: {e}")))?;
        let vector = point
            .vectors
            .and_then(|v| v.vectors_options)
            .and_then(|options| match options {
                qdrant_client::qdrant::vectors::VectorsOptions::Vector(v) => Some(v.data),
                _ => None,
            })
            .unwrap_or_default();
        Ok(Some((vector, payload)))
    }
}
