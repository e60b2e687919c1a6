// Copyright 2025 Cowboy AI, LLC.

//! Embedding reuse cache
//!
//! Keyed by content hash, so a chunk re-embedded anywhere in the corpus
//! reuses the vector computed for identical content. Hit and miss
//! counters surface through `tracing` so the reuse contract is
//! observable in production.

use crate::errors::NodeResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

use super::provider::EmbeddingProvider;

/// LRU cache of embeddings keyed by content hash
pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a cache bounded to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached embedding by content hash
    pub fn get(&self, content_hash: &str) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock().expect("cache lock");
        match entries.get(content_hash) {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an embedding under its content hash
    pub fn put(&self, content_hash: impl Into<String>, vector: Vec<f32>) {
        let mut entries = self.entries.lock().expect("cache lock");
        entries.put(content_hash.into(), vector);
    }

    /// Fetch from cache or embed through the provider
    pub async fn get_or_embed(
        &self,
        provider: &dyn EmbeddingProvider,
        content_hash: &str,
        text: &str,
    ) -> NodeResult<Vec<f32>> {
        if let Some(vector) = self.get(content_hash) {
            debug!(content_hash, "embedding cache hit");
            return Ok(vector);
        }
        let vector = provider.embed(text).await?;
        self.put(content_hash, vector.clone());
        debug!(content_hash, "embedding cache miss, provider called");
        Ok(vector)
    }

    /// Cache hits observed so far
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache misses observed so far
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::DeterministicEmbedder;

    #[tokio::test]
    async fn get_or_embed_calls_provider_once_per_hash() {
        let cache = EmbeddingCache::new(8);
        let provider = DeterministicEmbedder::new(8);

        let first = cache
            .get_or_embed(&provider, "sha256:aaaa", "text")
            .await
            .unwrap();
        let second = cache
            .get_or_embed(&provider, "sha256:aaaa", "text")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = EmbeddingCache::new(1);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some(vec![2.0]));
    }
}
