// Copyright 2025 Cowboy AI, LLC.

//! Aggregate configuration
//!
//! Every threshold, TTL, and weight in the pipeline is a default here
//! and can be overridden per deployment. Component configs live next to
//! their components; this module gathers them into one record that can
//! be loaded from a single document.

use crate::chunker::ChunkerConfig;
use crate::contract::RetryPolicy;
use crate::events::consumer::ConsumerConfig;
use crate::events::publisher::PublisherConfig;
use crate::ingestion::IngestionConfig;
use crate::patterns::learning::SuccessCriteria;
use crate::patterns::matcher::MatcherConfig;
use crate::quality::MaturityBands;
use crate::search::SearchConfig;
use crate::semantics::SemanticAnalyzerConfig;
use serde::{Deserialize, Serialize};

/// Retention policy for the processed-events table and the pattern pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Processed-event rows older than this many seconds are purged
    pub processed_events_ttl_secs: u64,
    /// Success-rate floor below which patterns leave matching
    pub retention_floor: f32,
    /// Usages a pattern must accumulate before the floor applies
    pub observation_min_usages: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            processed_events_ttl_secs: 7 * 24 * 60 * 60,
            retention_floor: 0.3,
            observation_min_usages: 5,
        }
    }
}

/// Embedding engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding dimension declared to collections
    pub dimension: usize,
    /// Reuse cache capacity, in entries
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            cache_capacity: 4096,
        }
    }
}

/// Everything the intelligence pipeline reads at construction time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntelligenceConfig {
    /// Chunker sizes and overlap
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Semantic analyzer limits
    #[serde(default)]
    pub semantics: SemanticAnalyzerConfig,
    /// Embedding dimension and cache
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Ingestion fan-out and size contracts
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Publisher retries, breaker, payload ceiling
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Consumer retries and back-pressure ceiling
    #[serde(default)]
    pub consumer: ConsumerConfig,
    /// Success criteria for pattern extraction
    #[serde(default)]
    pub success_criteria: SuccessCriteria,
    /// Matcher weights and thresholds
    #[serde(default)]
    pub matcher: MatcherConfig,
    /// Search fusion weights
    #[serde(default)]
    pub search: SearchConfig,
    /// TTLs and pattern retention
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Maturity score floors
    #[serde(default)]
    pub maturity: MaturityBands,
    /// Default retry policy for store Effects
    #[serde(default)]
    pub store_retry: RetryPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_the_declared_contract_values() {
        let config = IntelligenceConfig::default();
        assert_eq!(config.retention.processed_events_ttl_secs, 604_800);
        assert_eq!(config.matcher.semantic_weight, 0.40);
        assert_eq!(config.matcher.auto_apply_threshold, 0.85);
        assert_eq!(config.matcher.suggest_threshold, 0.75);
        assert_eq!(config.search.weights.semantic, 0.5);
        assert_eq!(config.search.weights.structural, 0.3);
        assert_eq!(config.search.weights.relational, 0.2);
        assert_eq!(config.chunker.generic_chunk_size, 1000);
        assert_eq!(config.ingestion.limits.inline_file_limit_bytes, 102_400);
        assert_eq!(config.ingestion.limits.inline_batch_limit_bytes, 5_242_880);
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = IntelligenceConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: IntelligenceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.retention.processed_events_ttl_secs,
            config.retention.processed_events_ttl_secs
        );
        assert_eq!(back.embedding.dimension, config.embedding.dimension);
    }

    #[test]
    fn partial_documents_fill_from_defaults() {
        let json = r#"{"embedding": {"dimension": 768, "cache_capacity": 128}}"#;
        let config: IntelligenceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.matcher.candidate_limit, 10);
    }
}
