// Copyright 2025 Cowboy AI, LLC.

//! Learned execution patterns
//!
//! A pattern is a distilled, reusable representation of a successful
//! execution chain. Counters and the derived success rate drive both
//! matching and retention.

use crate::identifiers::{PatternId, TraceId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The execution path a pattern replays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionPath {
    /// Agent that executed the chain
    pub agent: String,
    /// Ordered hook types
    pub hook_types: Vec<String>,
    /// Ordered endpoint paths expected during replay
    pub endpoint_paths: Vec<String>,
}

/// Latency profile observed for a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PerformanceProfile {
    /// Average endpoint latency in milliseconds
    pub avg_latency_ms: f64,
    /// Minimum observed latency in milliseconds
    pub min_latency_ms: u64,
    /// Maximum observed latency in milliseconds
    pub max_latency_ms: u64,
}

impl PerformanceProfile {
    /// Build a profile from observed latencies; `None` when empty
    pub fn from_latencies(latencies: &[u64]) -> Option<Self> {
        if latencies.is_empty() {
            return None;
        }
        let sum: u64 = latencies.iter().sum();
        Some(Self {
            avg_latency_ms: sum as f64 / latencies.len() as f64,
            min_latency_ms: *latencies.iter().min().expect("non-empty"),
            max_latency_ms: *latencies.iter().max().expect("non-empty"),
        })
    }
}

/// A learned, reusable execution pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pattern {
    /// Pattern identifier
    pub pattern_id: PatternId,
    /// Trace the pattern was extracted from
    pub source_trace_id: TraceId,
    /// Prompt that started the source chain
    pub prompt_text: String,
    /// Embedding of the prompt
    pub prompt_embedding: Vec<f32>,
    /// Classified intent tag
    pub intent: String,
    /// Keyword set extracted from the prompt
    pub keywords: BTreeSet<String>,
    /// Execution path to replay
    pub execution_path: ExecutionPath,
    /// Observed latency profile
    pub performance_profile: Option<PerformanceProfile>,
    /// Times the pattern was offered and used
    pub usage_count: u64,
    /// Uses that ended in success
    pub success_count: u64,
    /// Uses that ended in failure
    pub failure_count: u64,
    /// Initial weighted score, used until usage accumulates
    pub initial_score: f32,
    /// Soft-deletion flag; inactive patterns are excluded from matching
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Pattern {
    /// Derived success rate: counters when used, initial score before
    pub fn success_rate(&self) -> f32 {
        if self.usage_count == 0 {
            self.initial_score
        } else {
            (self.success_count as f64 / self.usage_count as f64) as f32
        }
    }

    /// Record one use outcome
    pub fn record_outcome(&mut self, success: bool) {
        self.usage_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }

    /// Whether the pattern may be offered by the matcher
    pub fn is_active(&self, retention_floor: f32) -> bool {
        self.active && self.success_rate() >= retention_floor
    }
}

/// Outcome of one pattern use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    /// Replay succeeded
    Success,
    /// Replay failed
    Failure,
    /// Pattern was surfaced but not used
    Skipped,
}

/// One row of the pattern usage log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternUsage {
    /// Pattern that was matched
    pub pattern_id: PatternId,
    /// Correlation of the requesting workflow
    pub correlation_id: crate::identifiers::CorrelationId,
    /// Match score at offer time
    pub match_score: f32,
    /// Whether the pattern was actually used
    pub used: bool,
    /// Outcome of the use
    pub outcome: UsageOutcome,
    /// Deviations from the expected execution path
    pub deviations: Vec<String>,
    /// When the use was recorded
    pub created_at: DateTime<Utc>,
}
