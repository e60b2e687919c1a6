// Copyright 2025 Cowboy AI, LLC.

//! Pattern extraction from execution traces
//!
//! A trace becomes a pattern only when every success gate passes. The
//! per-criterion weighted score seeds the pattern's success rate until
//! real usage accumulates.

use crate::embedding::provider::EmbeddingProvider;
use crate::errors::NodeResult;
use crate::identifiers::PatternId;
use crate::semantics::tokenize;
use crate::trace::{ExecutionTrace, TraceStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::model::{ExecutionPath, Pattern, PerformanceProfile};

/// Success criteria a trace must satisfy to be extracted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCriteria {
    /// Weight of the execution-completed gate
    pub completed_weight: f32,
    /// Weight of the no-errors gate
    pub no_errors_weight: f32,
    /// Weight of the mandatory-hooks gate
    pub hooks_weight: f32,
    /// Weight of the no-timeout gate
    pub timeout_weight: f32,
    /// Weight of the performance gate
    pub performance_weight: f32,
    /// Average endpoint latency ceiling; `None` disables the gate's
    /// threshold and it passes by default
    pub max_avg_latency_ms: Option<f64>,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self {
            completed_weight: 0.30,
            no_errors_weight: 0.25,
            hooks_weight: 0.20,
            timeout_weight: 0.15,
            performance_weight: 0.10,
            max_avg_latency_ms: None,
        }
    }
}

/// One evaluated gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    /// Gate name
    pub name: String,
    /// Whether the gate passed
    pub passed: bool,
    /// Gate weight
    pub weight: f32,
}

/// Result of evaluating a trace against the criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaEvaluation {
    /// Per-gate results
    pub gates: Vec<Gate>,
    /// Weighted score over all gates, in [0,1]
    pub weighted_score: f32,
}

impl CriteriaEvaluation {
    /// Eligibility requires every boolean gate to pass
    pub fn is_successful(&self) -> bool {
        self.gates.iter().all(|g| g.passed)
    }
}

impl SuccessCriteria {
    /// Evaluate a trace against every gate
    pub fn evaluate(&self, trace: &ExecutionTrace) -> CriteriaEvaluation {
        let avg_latency = {
            let latencies = trace.latencies_ms();
            if latencies.is_empty() {
                0.0
            } else {
                latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
            }
        };

        let gates = vec![
            Gate {
                name: "execution_completed".into(),
                passed: trace.completed_at.is_some() && trace.status.is_terminal(),
                weight: self.completed_weight,
            },
            Gate {
                name: "no_errors".into(),
                passed: trace.status != TraceStatus::Error && !trace.has_errors(),
                weight: self.no_errors_weight,
            },
            Gate {
                name: "mandatory_hooks_succeeded".into(),
                passed: trace.mandatory_hooks_succeeded(),
                weight: self.hooks_weight,
            },
            Gate {
                name: "no_timeout".into(),
                passed: trace.status != TraceStatus::Timeout,
                weight: self.timeout_weight,
            },
            Gate {
                name: "performance_within_threshold".into(),
                passed: self
                    .max_avg_latency_ms
                    .map_or(true, |ceiling| avg_latency <= ceiling),
                weight: self.performance_weight,
            },
        ];

        let total: f32 = gates.iter().map(|g| g.weight).sum();
        let passed: f32 = gates.iter().filter(|g| g.passed).map(|g| g.weight).sum();
        let weighted_score = if total > 0.0 { passed / total } else { 0.0 };

        CriteriaEvaluation {
            gates,
            weighted_score,
        }
    }
}

/// Keyword set for a prompt: lowercased tokens, stop words removed
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.len() > 2)
        .take(16)
        .collect()
}

/// Intent tags recognized by the classifier, with their trigger verbs
const INTENTS: &[(&str, &[&str])] = &[
    ("fix", &["fix", "debug", "repair", "resolve", "patch"]),
    ("create", &["add", "create", "implement", "build", "write", "new"]),
    ("refactor", &["refactor", "clean", "improve", "optimize", "simplify", "rework"]),
    ("validate", &["test", "verify", "validate", "check", "assert"]),
    ("explain", &["explain", "describe", "document", "what", "how", "why"]),
    ("search", &["search", "find", "locate", "list", "show"]),
];

/// Classify a request into an intent tag
pub fn classify_intent(text: &str) -> String {
    let tokens = tokenize(text);
    for (intent, triggers) in INTENTS {
        if tokens.iter().any(|t| triggers.contains(&t.as_str())) {
            return (*intent).to_string();
        }
    }
    "general".to_string()
}

/// Extracts patterns from eligible traces
pub struct PatternExtractor {
    criteria: SuccessCriteria,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new(SuccessCriteria::default())
    }
}

impl PatternExtractor {
    /// Create an extractor with explicit criteria
    pub fn new(criteria: SuccessCriteria) -> Self {
        Self { criteria }
    }

    /// The criteria in force
    pub fn criteria(&self) -> &SuccessCriteria {
        &self.criteria
    }

    /// Evaluate the gates without extracting
    pub fn evaluate(&self, trace: &ExecutionTrace) -> CriteriaEvaluation {
        self.criteria.evaluate(trace)
    }

    /// Extract a pattern from a trace, embedding its prompt
    ///
    /// Returns `None` when the trace fails any gate.
    pub async fn learn(
        &self,
        trace: &ExecutionTrace,
        provider: &dyn EmbeddingProvider,
    ) -> NodeResult<Option<Pattern>> {
        let evaluation = self.evaluate(trace);
        if !evaluation.is_successful() {
            debug!(trace_id = %trace.trace_id, "trace failed success gates, not extracted");
            return Ok(None);
        }

        let prompt_embedding = provider.embed(&trace.prompt_text).await?;
        let pattern = Pattern {
            pattern_id: PatternId::new(),
            source_trace_id: trace.trace_id,
            prompt_text: trace.prompt_text.clone(),
            prompt_embedding,
            intent: classify_intent(&trace.prompt_text),
            keywords: extract_keywords(&trace.prompt_text),
            execution_path: ExecutionPath {
                agent: trace.agent.clone(),
                hook_types: trace.hook_types(),
                endpoint_paths: trace.endpoint_paths(),
            },
            performance_profile: PerformanceProfile::from_latencies(&trace.latencies_ms()),
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            initial_score: evaluation.weighted_score,
            active: true,
            created_at: Utc::now(),
        };
        Ok(Some(pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::DeterministicEmbedder;
    use crate::identifiers::{CorrelationId, TraceId};
    use crate::trace::{EndpointCall, HookExecution};
    use test_case::test_case;

    fn passing_trace() -> ExecutionTrace {
        let started = Utc::now();
        ExecutionTrace {
            trace_id: TraceId::new(),
            correlation_id: CorrelationId::new(),
            parent_id: None,
            session_id: "s".into(),
            agent: "code-agent".into(),
            prompt_text: "add a search endpoint to the api".into(),
            started_at: started,
            completed_at: Some(started + chrono::Duration::milliseconds(900)),
            status: TraceStatus::Success,
            hook_sequence: vec![HookExecution {
                hook_type: "pre_validate".into(),
                success: true,
                mandatory: true,
                duration_ms: 10,
            }],
            endpoint_calls: vec![EndpointCall {
                path: "/api/intelligence/analyze".into(),
                status: 200,
                latency_ms: 100,
            }],
        }
    }

    #[tokio::test]
    async fn passing_trace_is_extracted_with_weighted_initial_score() {
        let extractor = PatternExtractor::default();
        let provider = DeterministicEmbedder::new(16);
        let trace = passing_trace();

        let pattern = extractor.learn(&trace, &provider).await.unwrap().unwrap();
        assert_eq!(pattern.source_trace_id, trace.trace_id);
        assert_eq!(pattern.usage_count, 0);
        assert_eq!(pattern.initial_score, 1.0);
        assert!(pattern.success_rate() >= 0.7);
        assert_eq!(pattern.execution_path.hook_types, vec!["pre_validate"]);
        assert_eq!(pattern.intent, "create");
        assert!(pattern.keywords.contains("search"));
    }

    enum Break {
        InProgress,
        HookFailure,
        Timeout,
        EndpointError,
        SlowEndpoints,
    }

    fn broken_trace(kind: Break) -> ExecutionTrace {
        let mut trace = passing_trace();
        match kind {
            Break::InProgress => {
                trace.status = TraceStatus::InProgress;
                trace.completed_at = None;
            }
            Break::HookFailure => trace.hook_sequence[0].success = false,
            Break::Timeout => trace.status = TraceStatus::Timeout,
            Break::EndpointError => trace.endpoint_calls[0].status = 500,
            Break::SlowEndpoints => trace.endpoint_calls[0].latency_ms = 10_000,
        }
        trace
    }

    #[test_case(Break::InProgress; "incomplete execution")]
    #[test_case(Break::HookFailure; "mandatory hook failed")]
    #[test_case(Break::Timeout; "timed out")]
    #[test_case(Break::EndpointError; "endpoint error")]
    fn failing_any_gate_blocks_extraction(kind: Break) {
        let extractor = PatternExtractor::default();
        let evaluation = extractor.evaluate(&broken_trace(kind));
        assert!(!evaluation.is_successful());
        assert!(evaluation.weighted_score < 1.0);
    }

    #[tokio::test]
    async fn ineligible_trace_is_not_extracted() {
        let extractor = PatternExtractor::default();
        let provider = DeterministicEmbedder::new(16);
        let trace = broken_trace(Break::HookFailure);
        assert!(extractor.learn(&trace, &provider).await.unwrap().is_none());
    }

    #[test]
    fn performance_gate_uses_the_configured_ceiling() {
        let extractor = PatternExtractor::new(SuccessCriteria {
            max_avg_latency_ms: Some(500.0),
            ..SuccessCriteria::default()
        });
        let fast = extractor.evaluate(&passing_trace());
        assert!(fast.is_successful());

        let slow = extractor.evaluate(&broken_trace(Break::SlowEndpoints));
        assert!(!slow.is_successful());
        // Only the performance gate failed.
        assert_eq!(
            slow.gates.iter().filter(|g| !g.passed).count(),
            1
        );
    }

    #[test]
    fn intent_classification_is_keyword_driven() {
        assert_eq!(classify_intent("fix the failing build"), "fix");
        assert_eq!(classify_intent("add a new consumer"), "create");
        assert_eq!(classify_intent("refactor the store layer"), "refactor");
        assert_eq!(classify_intent("verify idempotency"), "validate");
        assert_eq!(classify_intent("how does routing work"), "explain");
        assert_eq!(classify_intent("locate the config"), "search");
        assert_eq!(classify_intent("hello there"), "general");
    }

    #[test]
    fn keywords_drop_stop_words_and_short_tokens() {
        let keywords = extract_keywords("add a new search endpoint to the api");
        assert!(keywords.contains("search"));
        assert!(keywords.contains("endpoint"));
        assert!(!keywords.contains("a"));
        assert!(!keywords.contains("to"));
    }
}
