// Copyright 2025 Cowboy AI, LLC.

//! Incremental embedding engine (Compute classification + vector Effect)
//!
//! Given the previous and current chunking of a document, classify each
//! current chunk as unchanged, modified, or added, embed only what
//! changed, reuse vectors for unchanged content, and delete embeddings
//! whose chunks disappeared. After a run the store holds exactly one
//! embedding per current chunk and nothing else for that document.

use crate::chunk::Chunk;
use crate::errors::{NodeError, NodeResult};
use crate::stores::vector::{VectorPayload, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::cache::EmbeddingCache;
use super::provider::EmbeddingProvider;

/// Classification of a chunk between two document versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkChange {
    /// Content hash unchanged; embedding is reused
    Unchanged,
    /// Content changed; embedding is recomputed
    Modified,
    /// Chunk is new in this version
    Added,
    /// Chunk existed only in the previous version
    Removed,
}

/// One classified current chunk
#[derive(Debug, Clone)]
pub struct ClassifiedChunk {
    /// The current-version chunk
    pub chunk: Chunk,
    /// Its classification
    pub change: ChunkChange,
    /// Embedding carried over from the previous version, when unchanged
    pub reusable: Option<Vec<f32>>,
}

/// Classification of a whole document version change
#[derive(Debug, Clone, Default)]
pub struct ChunkDelta {
    /// Current chunks with their classification
    pub current: Vec<ClassifiedChunk>,
    /// Previous chunks with no counterpart in the current version
    pub removed: Vec<Chunk>,
}

/// Classify current chunks against the previous version
///
/// When a unified diff is provided, any chunk overlapping a hunk's
/// new-file range is modified regardless of hashes; untouched chunks
/// reuse by content hash. Without a diff, content hashes alone decide.
pub fn classify_chunks(previous: &[Chunk], current: &[Chunk], diff: Option<&str>) -> ChunkDelta {
    let previous_by_hash: HashMap<&str, &Chunk> = previous
        .iter()
        .map(|c| (c.content_hash.as_str(), c))
        .collect();

    let touched_lines = diff.map(parse_unified_diff);
    let line_spans = touched_lines.as_ref().map(|_| chunk_line_spans(current));

    let mut classified = Vec::with_capacity(current.len());
    for (index, chunk) in current.iter().enumerate() {
        let matched = previous_by_hash.get(chunk.content_hash.as_str());

        let touched = match (&touched_lines, &line_spans) {
            (Some(hunks), Some(spans)) => {
                let (start, end) = spans[index];
                hunks.iter().any(|(h_start, h_end)| {
                    *h_start < end && start < *h_end
                })
            }
            _ => false,
        };

        let (change, reusable) = match matched {
            Some(prev) if !touched => (
                ChunkChange::Unchanged,
                prev.embedding.clone(),
            ),
            Some(_) => (ChunkChange::Modified, None),
            None if chunk.ordinal < previous.len() => (ChunkChange::Modified, None),
            None => (ChunkChange::Added, None),
        };

        classified.push(ClassifiedChunk {
            chunk: chunk.clone(),
            change,
            reusable,
        });
    }

    let current_ids: HashSet<&str> = current.iter().map(|c| c.chunk_id.as_str()).collect();
    let removed = previous
        .iter()
        .filter(|c| !current_ids.contains(c.chunk_id.as_str()))
        .cloned()
        .collect();

    ChunkDelta {
        current: classified,
        removed,
    }
}

/// Line spans `[start, end)` of each chunk, assuming chunks cover the
/// document in order
fn chunk_line_spans(chunks: &[Chunk]) -> Vec<(usize, usize)> {
    let mut spans = Vec::with_capacity(chunks.len());
    let mut line = 1usize;
    for chunk in chunks {
        let lines = chunk.content.matches('\n').count().max(1);
        spans.push((line, line + lines));
        line += lines;
    }
    spans
}

/// New-file line ranges `[start, end)` of a unified diff's hunks
pub fn parse_unified_diff(diff: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    for line in diff.lines() {
        let Some(rest) = line.strip_prefix("@@ ") else {
            continue;
        };
        let Some(plus) = rest.split_whitespace().find(|p| p.starts_with('+')) else {
            continue;
        };
        let spec = &plus[1..];
        let (start, count) = match spec.split_once(',') {
            Some((s, c)) => (s.parse::<usize>().ok(), c.parse::<usize>().ok()),
            None => (spec.parse::<usize>().ok(), Some(1)),
        };
        if let (Some(start), Some(count)) = (start, count) {
            ranges.push((start, start + count.max(1)));
        }
    }
    ranges
}

/// Outcome of one engine run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Chunks embedded through the provider path
    pub embedded: usize,
    /// Chunks whose vectors were reused
    pub reused: usize,
    /// Stale embeddings deleted
    pub removed: usize,
}

/// Diff-driven embedding engine
pub struct IncrementalEmbeddingEngine {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    store: Arc<dyn VectorStore>,
}

impl IncrementalEmbeddingEngine {
    /// Wire the engine to its provider, cache, and vector store
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            provider,
            cache,
            store,
        }
    }

    /// Classify and embed, without touching the store's contents
    ///
    /// Provider calls happen here; reads against the store are allowed
    /// to recover embeddings of unchanged chunks.
    pub async fn prepare(
        &self,
        collection: &str,
        previous: &[Chunk],
        current: &[Chunk],
        diff: Option<&str>,
    ) -> NodeResult<SyncPlan> {
        let delta = classify_chunks(previous, current, diff);
        let mut report = SyncReport::default();
        let mut embedded_chunks = Vec::with_capacity(delta.current.len());

        for classified in delta.current {
            let chunk = classified.chunk;
            let vector = match (classified.change, classified.reusable) {
                (ChunkChange::Unchanged, Some(vector)) => {
                    report.reused += 1;
                    vector
                }
                (ChunkChange::Unchanged, None) => {
                    // Previous chunk carried no in-memory embedding; the
                    // store still has it under the same chunk id.
                    match self.store.get(collection, &chunk.chunk_id).await? {
                        Some((vector, _)) => {
                            report.reused += 1;
                            vector
                        }
                        None => {
                            report.embedded += 1;
                            self.cache
                                .get_or_embed(
                                    self.provider.as_ref(),
                                    &chunk.content_hash,
                                    &chunk.content,
                                )
                                .await?
                        }
                    }
                }
                _ => {
                    report.embedded += 1;
                    self.cache
                        .get_or_embed(self.provider.as_ref(), &chunk.content_hash, &chunk.content)
                        .await?
                }
            };

            if vector.len() != self.provider.dimension() {
                return Err(NodeError::PreconditionViolated(format!(
                    "embedding dimension {} does not match provider dimension {}",
                    vector.len(),
                    self.provider.dimension()
                )));
            }

            embedded_chunks.push(chunk.with_embedding(vector));
        }

        report.removed = delta.removed.len();
        Ok(SyncPlan {
            chunks: embedded_chunks,
            removed: delta.removed,
            report,
        })
    }

    /// Apply a prepared plan to the vector store
    pub async fn apply(&self, collection: &str, plan: &SyncPlan) -> NodeResult<()> {
        for chunk in &plan.chunks {
            let vector = chunk
                .embedding
                .clone()
                .ok_or_else(|| NodeError::Internal("prepared chunk lost its embedding".into()))?;
            let payload = VectorPayload {
                chunk_id: chunk.chunk_id.clone(),
                document_id: chunk.document_id.clone(),
                ordinal: chunk.ordinal,
                content_hash: chunk.content_hash.clone(),
                kind: chunk.kind,
                metadata: Default::default(),
            };
            self.store.upsert(collection, vector, payload).await?;
        }
        for stale in &plan.removed {
            self.store.delete(collection, &stale.chunk_id).await?;
        }

        debug!(
            collection,
            embedded = plan.report.embedded,
            reused = plan.report.reused,
            removed = plan.report.removed,
            "document embeddings synchronized"
        );
        Ok(())
    }

    /// Bring the vector store in line with the current document version
    ///
    /// Returns the current chunks with embeddings attached, plus a
    /// report of what was embedded, reused, and removed.
    pub async fn sync_document(
        &self,
        collection: &str,
        previous: &[Chunk],
        current: &[Chunk],
        diff: Option<&str>,
    ) -> NodeResult<(Vec<Chunk>, SyncReport)> {
        let plan = self.prepare(collection, previous, current, diff).await?;
        self.apply(collection, &plan).await?;
        Ok((plan.chunks, plan.report))
    }
}

/// A prepared synchronization: embedded chunks, stale chunks, report
#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// Current chunks with embeddings attached
    pub chunks: Vec<Chunk>,
    /// Previous chunks whose embeddings must be deleted
    pub removed: Vec<Chunk>,
    /// What the preparation embedded and reused
    pub report: SyncReport,
}
