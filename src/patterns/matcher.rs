// Copyright 2025 Cowboy AI, LLC.

//! Pattern matching (Compute)
//!
//! Scores candidate patterns against a request with a fixed weighted
//! blend of semantic similarity, keyword overlap, intent agreement,
//! context fit, and historical success. Ranking multiplies the score by
//! the pattern's success rate; ties break on pattern id so a fixed
//! candidate set always ranks identically.

use crate::embedding::cache::EmbeddingCache;
use crate::embedding::provider::EmbeddingProvider;
use crate::errors::NodeResult;
use crate::hashing::content_hash;
use crate::semantics::cosine_similarity;
use crate::stores::relational::PatternStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use super::learning::{classify_intent, extract_keywords};
use super::model::{Pattern, PatternUsage, PerformanceProfile};

/// Matcher weights and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Weight of semantic similarity
    pub semantic_weight: f32,
    /// Weight of keyword overlap
    pub keyword_weight: f32,
    /// Weight of intent agreement
    pub intent_weight: f32,
    /// Weight of context fit
    pub context_weight: f32,
    /// Weight of historical success rate
    pub success_weight: f32,
    /// Candidates retrieved by vector similarity before scoring
    pub candidate_limit: usize,
    /// Matches below this score are not surfaced
    pub suggest_threshold: f32,
    /// Matches at or above this score auto-apply
    pub auto_apply_threshold: f32,
    /// Success-rate floor below which patterns leave the pool
    pub retention_floor: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.40,
            keyword_weight: 0.20,
            intent_weight: 0.20,
            context_weight: 0.10,
            success_weight: 0.10,
            candidate_limit: 10,
            suggest_threshold: 0.75,
            auto_apply_threshold: 0.85,
            retention_floor: 0.3,
        }
    }
}

/// Context accompanying a match request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchContext {
    /// Domain the request belongs to
    pub domain: Option<String>,
    /// Agent that handled the previous step
    pub previous_agent: Option<String>,
    /// Extension of the file in focus
    pub file_extension: Option<String>,
}

/// Per-factor score breakdown
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchComponents {
    /// Cosine similarity of prompt embeddings
    pub semantic: f32,
    /// Jaccard overlap of keyword sets
    pub keyword: f32,
    /// Intent agreement (1.0 equal, 0.3 otherwise)
    pub intent: f32,
    /// Context fit (1.0 domain match, 0.5 otherwise)
    pub context: f32,
    /// Pattern success rate
    pub success: f32,
}

/// What the matcher decided for one pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    /// Score cleared the auto-apply threshold; replay the pattern
    AutoApply,
    /// Score cleared the suggestion threshold; offer alongside normal
    /// routing
    Suggest,
}

/// One step of a replay plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookStep {
    /// Hook type to run
    pub hook_type: String,
    /// Intelligence functions expected during this step
    pub expected_functions: Vec<String>,
}

/// Instructions for re-executing a pattern against a new request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayPlan {
    /// Agent to execute
    pub agent: String,
    /// Ordered hook plan
    pub hook_plan: Vec<HookStep>,
    /// Ordered endpoint calls expected during replay
    pub expected_endpoints: Vec<String>,
    /// Latency expectations from the pattern's profile
    pub performance: Option<PerformanceProfile>,
    /// Confidence, equal to the pattern's current success rate
    pub confidence: f32,
}

/// A scored, ranked pattern match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// The matched pattern
    pub pattern: Pattern,
    /// Blended match score in [0,1]
    pub score: f32,
    /// Score breakdown
    pub components: MatchComponents,
    /// Ranking key: score times success rate
    pub rank: f32,
    /// Decision for this match
    pub action: MatchAction,
    /// Replay plan, present when the action is auto-apply
    pub replay_plan: Option<ReplayPlan>,
}

/// Matches requests against the learned pattern pool
pub struct PatternMatcher {
    store: Arc<dyn PatternStore>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    config: MatcherConfig,
}

impl PatternMatcher {
    /// Wire a matcher
    pub fn new(
        store: Arc<dyn PatternStore>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            store,
            provider,
            cache,
            config,
        }
    }

    /// Match a request against the active pattern pool
    ///
    /// Returns surfaced matches, best first. Matches below the
    /// suggestion threshold are dropped.
    pub async fn match_request(
        &self,
        user_request: &str,
        context: &MatchContext,
    ) -> NodeResult<Vec<PatternMatch>> {
        let request_hash = content_hash(user_request);
        let request_embedding = self
            .cache
            .get_or_embed(self.provider.as_ref(), &request_hash, user_request)
            .await?;
        let request_keywords = extract_keywords(user_request);
        let request_intent = classify_intent(user_request);

        // Candidate retrieval by vector similarity.
        let mut candidates = self.store.active_patterns(self.config.retention_floor).await?;
        candidates.sort_by(|a, b| {
            let sim_a = cosine_similarity(&request_embedding, &a.prompt_embedding);
            let sim_b = cosine_similarity(&request_embedding, &b.prompt_embedding);
            sim_b
                .partial_cmp(&sim_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pattern_id.0.cmp(&b.pattern_id.0))
        });
        candidates.truncate(self.config.candidate_limit);

        let mut matches: Vec<PatternMatch> = candidates
            .into_iter()
            .map(|pattern| {
                self.score_candidate(
                    pattern,
                    &request_embedding,
                    &request_keywords,
                    &request_intent,
                    context,
                )
            })
            .filter(|m| m.score >= self.config.suggest_threshold)
            .collect();

        matches.sort_by(|a, b| {
            b.rank
                .partial_cmp(&a.rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pattern.pattern_id.0.cmp(&b.pattern.pattern_id.0))
        });

        debug!(
            surfaced = matches.len(),
            request_intent, "pattern matching complete"
        );
        Ok(matches)
    }

    /// Record the outcome of an offered match
    pub async fn record_feedback(&self, usage: PatternUsage) -> NodeResult<Pattern> {
        self.store.record_usage(usage).await
    }

    fn score_candidate(
        &self,
        pattern: Pattern,
        request_embedding: &[f32],
        request_keywords: &BTreeSet<String>,
        request_intent: &str,
        context: &MatchContext,
    ) -> PatternMatch {
        let components = MatchComponents {
            semantic: cosine_similarity(request_embedding, &pattern.prompt_embedding).max(0.0),
            keyword: jaccard(request_keywords, &pattern.keywords),
            intent: if pattern.intent == request_intent {
                1.0
            } else {
                0.3
            },
            context: context_fit(context, &pattern),
            success: pattern.success_rate(),
        };

        let score = (self.config.semantic_weight * components.semantic
            + self.config.keyword_weight * components.keyword
            + self.config.intent_weight * components.intent
            + self.config.context_weight * components.context
            + self.config.success_weight * components.success)
            .clamp(0.0, 1.0);

        let rank = score * components.success;
        let action = if score >= self.config.auto_apply_threshold {
            MatchAction::AutoApply
        } else {
            MatchAction::Suggest
        };
        let replay_plan = match action {
            MatchAction::AutoApply => Some(build_replay_plan(&pattern)),
            MatchAction::Suggest => None,
        };

        PatternMatch {
            pattern,
            score,
            components,
            rank,
            action,
            replay_plan,
        }
    }
}

/// Jaccard overlap of two keyword sets
fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}

/// Context fit: full credit when the context demonstrably matches the
/// pattern, half credit otherwise
fn context_fit(context: &MatchContext, pattern: &Pattern) -> f32 {
    let domain_match = context
        .domain
        .as_deref()
        .is_some_and(|d| pattern.keywords.contains(&d.to_lowercase()));
    let agent_match = context
        .previous_agent
        .as_deref()
        .is_some_and(|a| a == pattern.execution_path.agent);
    let extension_match = context
        .file_extension
        .as_deref()
        .is_some_and(|e| pattern.prompt_text.contains(e));
    if domain_match || agent_match || extension_match {
        1.0
    } else {
        0.5
    }
}

/// Intelligence functions expected for a hook type during replay
fn expected_functions(hook_type: &str) -> Vec<String> {
    match hook_type {
        t if t.contains("validate") => vec!["schema_check".into(), "precondition_check".into()],
        t if t.contains("analyze") => vec!["semantic_analysis".into(), "quality_scoring".into()],
        t if t.contains("commit") || t.contains("store") => {
            vec!["graph_upsert".into(), "vector_upsert".into()]
        }
        _ => vec!["analyze".into()],
    }
}

fn build_replay_plan(pattern: &Pattern) -> ReplayPlan {
    ReplayPlan {
        agent: pattern.execution_path.agent.clone(),
        hook_plan: pattern
            .execution_path
            .hook_types
            .iter()
            .map(|hook_type| HookStep {
                hook_type: hook_type.clone(),
                expected_functions: expected_functions(hook_type),
            })
            .collect(),
        expected_endpoints: pattern.execution_path.endpoint_paths.clone(),
        performance: pattern.performance_profile.clone(),
        confidence: pattern.success_rate(),
    }
}
