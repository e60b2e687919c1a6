// Copyright 2025 Cowboy AI, LLC.

//! Vector store Effect
//!
//! Owns chunk embeddings, keyed by `chunk_id`, routed across named
//! collections. Writes are refused rather than silently truncated when
//! the embedding dimension does not match the collection; search is
//! deterministic, with lexicographic chunk-id tie-breaking.

use crate::chunk::ChunkKind;
use crate::entity::EntityKind;
use crate::errors::{NodeError, NodeResult};
use crate::identifiers::{ChunkId, DocumentId};
use crate::semantics::cosine_similarity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Payload stored alongside every vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    /// Chunk identifier, the upsert key
    pub chunk_id: ChunkId,
    /// Owning document
    pub document_id: DocumentId,
    /// Chunk position in the document
    pub ordinal: usize,
    /// Hash of the embedded content
    pub content_hash: String,
    /// Chunk kind
    pub kind: ChunkKind,
    /// Free metadata
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Declared shape of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name
    pub name: String,
    /// Declared embedding dimension
    pub dimension: usize,
}

/// Search filter over payload fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorFilter {
    /// Restrict to one document
    pub document_id: Option<DocumentId>,
    /// Restrict to one chunk kind
    pub kind: Option<ChunkKind>,
}

impl VectorFilter {
    fn matches(&self, payload: &VectorPayload) -> bool {
        self.document_id
            .as_ref()
            .map_or(true, |d| &payload.document_id == d)
            && self.kind.map_or(true, |k| payload.kind == k)
    }
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    /// Matched chunk
    pub chunk_id: ChunkId,
    /// Similarity score, higher is closer
    pub score: f32,
    /// Stored payload
    pub payload: VectorPayload,
}

/// Vector store operations
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Declare a collection; idempotent for an identical spec
    async fn ensure_collection(&self, spec: CollectionSpec) -> NodeResult<()>;

    /// Insert or overwrite a vector by `chunk_id`
    async fn upsert(
        &self,
        collection: &str,
        vector: Vec<f32>,
        payload: VectorPayload,
    ) -> NodeResult<()>;

    /// Remove a vector by `chunk_id`; absent ids are not an error
    async fn delete(&self, collection: &str, chunk_id: &ChunkId) -> NodeResult<()>;

    /// Top-k similarity search, score-descending, ties broken by
    /// lexicographic chunk id
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: Option<VectorFilter>,
        min_similarity: Option<f32>,
    ) -> NodeResult<Vec<VectorHit>>;

    /// Number of vectors in a collection
    async fn count(&self, collection: &str) -> NodeResult<usize>;

    /// Fetch one stored vector and payload
    async fn get(
        &self,
        collection: &str,
        chunk_id: &ChunkId,
    ) -> NodeResult<Option<(Vec<f32>, VectorPayload)>>;
}

/// Deterministic routing of chunks to collections
///
/// Quality-scored documents land in the quality collection; everything
/// else in the default collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRouter {
    /// Default collection name
    pub default_collection: String,
    /// Collection for quality-scored documents
    pub quality_collection: String,
}

impl Default for CollectionRouter {
    fn default() -> Self {
        Self {
            default_collection: "chunks".into(),
            quality_collection: "chunks_quality".into(),
        }
    }
}

impl CollectionRouter {
    /// Route a chunk by its originating entity kind and whether the
    /// document carries a quality score
    pub fn route(&self, origin: EntityKind, quality_scored: bool) -> &str {
        if quality_scored && matches!(origin, EntityKind::File | EntityKind::Document) {
            &self.quality_collection
        } else {
            &self.default_collection
        }
    }

    /// Every collection the router can address
    pub fn collections(&self) -> [&str; 2] {
        [&self.default_collection, &self.quality_collection]
    }
}

struct Collection {
    dimension: usize,
    points: BTreeMap<ChunkId, (Vec<f32>, VectorPayload)>,
}

/// Reference in-memory vector store
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryVectorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> NodeError {
        NodeError::Internal("vector store lock poisoned".into())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, spec: CollectionSpec) -> NodeResult<()> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_err())?;
        match collections.get(&spec.name) {
            Some(existing) if existing.dimension != spec.dimension => {
                Err(NodeError::PreconditionViolated(format!(
                    "collection `{}` already declared with dimension {}",
                    spec.name, existing.dimension
                )))
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    spec.name,
                    Collection {
                        dimension: spec.dimension,
                        points: BTreeMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert(
        &self,
        collection: &str,
        vector: Vec<f32>,
        payload: VectorPayload,
    ) -> NodeResult<()> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_err())?;
        let collection = collections.get_mut(collection).ok_or_else(|| {
            NodeError::PreconditionViolated(format!("collection `{collection}` is not declared"))
        })?;

        if vector.len() != collection.dimension {
            return Err(NodeError::PreconditionViolated(format!(
                "embedding dimension {} does not match collection dimension {}",
                vector.len(),
                collection.dimension
            )));
        }

        // Same chunk id with a different content hash means two writers
        // disagree about the content; refuse instead of racing.
        if let Some((_, existing)) = collection.points.get(&payload.chunk_id) {
            if existing.content_hash != payload.content_hash {
                return Err(NodeError::PreconditionViolated(format!(
                    "chunk `{}` already stored with a different content hash",
                    payload.chunk_id
                )));
            }
        }

        collection
            .points
            .insert(payload.chunk_id.clone(), (vector, payload));
        Ok(())
    }

    async fn delete(&self, collection: &str, chunk_id: &ChunkId) -> NodeResult<()> {
        let mut collections = self.collections.write().map_err(|_| Self::lock_err())?;
        if let Some(collection) = collections.get_mut(collection) {
            collection.points.remove(chunk_id);
        }
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
        let collections = self.collections.read().map_err(|_| Self::lock_err())?;
        let collection = collections.get(collection).ok_or_else(|| {
            NodeError::PreconditionViolated(format!("collection `{collection}` is not declared"))
        })?;

        if vector.len() != collection.dimension {
            return Err(NodeError::PreconditionViolated(format!(
                "query dimension {} does not match collection dimension {}",
                vector.len(),
                collection.dimension
            )));
        }

        let mut hits: Vec<VectorHit> = collection
            .points
            .values()
            .filter(|(_, payload)| filter.as_ref().map_or(true, |f| f.matches(payload)))
            .map(|(stored, payload)| VectorHit {
                chunk_id: payload.chunk_id.clone(),
                score: cosine_similarity(vector, stored),
                payload: payload.clone(),
            })
            .filter(|hit| min_similarity.map_or(true, |min| hit.score >= min))
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self, collection: &str) -> NodeResult<usize> {
        let collections = self.collections.read().map_err(|_| Self::lock_err())?;
        Ok(collections
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0))
    }

    async fn get(
        &self,
        collection: &str,
        chunk_id: &ChunkId,
    ) -> NodeResult<Option<(Vec<f32>, VectorPayload)>> {
        let collections = self.collections.read().map_err(|_| Self::lock_err())?;
        Ok(collections
            .get(collection)
            .and_then(|c| c.points.get(chunk_id).cloned()))
    }
}
