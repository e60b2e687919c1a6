// Copyright 2025 Cowboy AI, LLC.

//! Embedding providers
//!
//! The provider is a remote capability: a string goes in, a
//! fixed-dimension float vector comes out. The deterministic provider
//! exists for tests and offline runs; it is stable across processes so
//! reuse assertions can compare vectors byte for byte.

use crate::errors::{NodeError, NodeResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// A remote capability returning a fixed-dimension vector for a string
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The dimension of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Embed one text
    async fn embed(&self, text: &str) -> NodeResult<Vec<f32>>;

    /// Embed a batch; the default implementation loops
    async fn embed_batch(&self, texts: &[String]) -> NodeResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Deterministic, hash-seeded embedding provider
///
/// A bag-of-tokens model: each token contributes a hash-seeded vector
/// and the sum is unit-normalized. Identical inputs always produce
/// byte-identical embeddings, and texts sharing vocabulary land close
/// together, which is what tests and offline runs need.
#[derive(Debug, Clone)]
pub struct DeterministicEmbedder {
    dimension: usize,
}

impl DeterministicEmbedder {
    /// Create a provider with the given output dimension
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Hash-expand a seed string into `dimension` values
    fn seed_values(&self, seed: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimension);
        let mut counter: u64 = 0;
        let mut block = [0u8; 32];

        while values.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(counter.to_be_bytes());
            block.copy_from_slice(&hasher.finalize());
            for pair in block.chunks_exact(2) {
                if values.len() == self.dimension {
                    break;
                }
                let raw = u16::from_be_bytes([pair[0], pair[1]]) as f32;
                values.push(raw / u16::MAX as f32 - 0.5);
            }
            counter += 1;
        }
        values
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> NodeResult<Vec<f32>> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut values = vec![0.0f32; self.dimension];
        if tokens.is_empty() {
            values = self.seed_values(text);
        } else {
            for token in &tokens {
                for (slot, value) in values.iter_mut().zip(self.seed_values(token)) {
                    *slot += value;
                }
            }
        }

        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
        Ok(values)
    }
}

/// HTTP embedding provider speaking a JSON contract
///
/// POSTs `{"input": "<text>"}` and expects `{"embedding": [..]}` with
/// the configured dimension.
#[cfg(feature = "remote-embeddings")]
pub mod remote {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Configuration for the HTTP embedding provider
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RemoteEmbedderConfig {
        /// Endpoint URL
        pub endpoint: String,
        /// Bearer token, when the endpoint requires one
        pub api_key: Option<String>,
        /// Declared output dimension
        pub dimension: usize,
        /// Request timeout in seconds
        pub timeout_secs: u64,
    }

    #[derive(Serialize)]
    struct EmbedRequest<'a> {
        input: &'a str,
    }

    #[derive(Deserialize)]
    struct EmbedResponse {
        embedding: Vec<f32>,
    }

    /// HTTP-backed embedding provider
    pub struct RemoteEmbedder {
        client: reqwest::Client,
        config: RemoteEmbedderConfig,
    }

    impl RemoteEmbedder {
        /// Build a provider from configuration
        pub fn new(config: RemoteEmbedderConfig) -> NodeResult<Self> {
            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| NodeError::permanent("embedding-provider", e.to_string()))?;
            Ok(Self { client, config })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for RemoteEmbedder {
        fn dimension(&self) -> usize {
            self.config.dimension
        }

        async fn embed(&self, text: &str) -> NodeResult<Vec<f32>> {
            let mut request = self
                .client
                .post(&self.config.endpoint)
                .json(&EmbedRequest { input: text });
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    NodeError::transient("embedding-provider", e.to_string())
                } else {
                    NodeError::permanent("embedding-provider", e.to_string())
                }
            })?;

            let status = response.status();
            if status.is_server_error() {
                return Err(NodeError::transient(
                    "embedding-provider",
                    format!("status {status}"),
                ));
            }
            if !status.is_success() {
                return Err(NodeError::permanent(
                    "embedding-provider",
                    format!("status {status}"),
                ));
            }

            let body: EmbedResponse = response
                .json()
                .await
                .map_err(|e| NodeError::permanent("embedding-provider", e.to_string()))?;

            if body.embedding.len() != self.config.dimension {
                return Err(NodeError::PreconditionViolated(format!(
                    "provider returned dimension {}, expected {}",
                    body.embedding.len(),
                    self.config.dimension
                )));
            }
            Ok(body.embedding)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_input_yields_byte_identical_vectors() {
        let provider = DeterministicEmbedder::new(32);
        let a = provider.embed("the same text").await.unwrap();
        let b = provider.embed("the same text").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[tokio::test]
    async fn different_input_yields_different_vectors() {
        let provider = DeterministicEmbedder::new(32);
        let a = provider.embed("one text").await.unwrap();
        let b = provider.embed("another text").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_unit_normalized() {
        let provider = DeterministicEmbedder::new(48);
        let v = provider.embed("normalize me").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn batch_embeds_in_order() {
        let provider = DeterministicEmbedder::new(16);
        let texts = vec!["a".to_string(), "b".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], provider.embed("a").await.unwrap());
        assert_eq!(batch[1], provider.embed("b").await.unwrap());
    }

    #[tokio::test]
    async fn shared_vocabulary_lands_closer_than_unrelated_text() {
        let provider = DeterministicEmbedder::new(64);
        let a = provider.embed("add a search endpoint").await.unwrap();
        let b = provider.embed("add a search endpoint quickly").await.unwrap();
        let c = provider.embed("bake sourdough bread tonight").await.unwrap();

        let close = crate::semantics::cosine_similarity(&a, &b);
        let far = crate::semantics::cosine_similarity(&a, &c);
        assert!(close > 0.8, "close pair scored {close}");
        assert!(far < 0.5, "far pair scored {far}");
    }

    #[tokio::test]
    async fn dimension_is_respected_for_odd_sizes() {
        let provider = DeterministicEmbedder::new(17);
        let v = provider.embed("odd").await.unwrap();
        assert_eq!(v.len(), 17);
    }
}
