// Copyright 2025 Cowboy AI, LLC.

//! Embedding engine: providers, reuse cache, incremental re-embedding

pub mod cache;
pub mod incremental;
pub mod provider;

pub use cache::EmbeddingCache;
pub use incremental::{
    classify_chunks, parse_unified_diff, ChunkChange, ChunkDelta, ClassifiedChunk,
    IncrementalEmbeddingEngine, SyncPlan, SyncReport,
};
pub use provider::{DeterministicEmbedder, EmbeddingProvider};

#[cfg(feature = "remote-embeddings")]
pub use provider::remote::{RemoteEmbedder, RemoteEmbedderConfig};
