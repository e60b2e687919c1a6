// Copyright 2025 Cowboy AI, LLC.

//! Relational pattern store Effect
//!
//! Owns three logical tables: `success_patterns`, `pattern_usage_log`,
//! and `processed_events`. The processed-events primary key is the
//! serialization point for consumer idempotency: a duplicate insert
//! means the event was already seen and is never an error.

use crate::errors::{NodeError, NodeResult};
use crate::identifiers::{EventId, PatternId};
use crate::patterns::model::{Pattern, PatternUsage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Relational store operations
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Insert a newly extracted pattern
    async fn insert_pattern(&self, pattern: Pattern) -> NodeResult<()>;

    /// Fetch one pattern
    async fn get_pattern(&self, pattern_id: &PatternId) -> NodeResult<Option<Pattern>>;

    /// Patterns eligible for matching: active and at or above the floor
    async fn active_patterns(&self, retention_floor: f32) -> NodeResult<Vec<Pattern>>;

    /// Append a usage row and update the pattern's counters atomically;
    /// returns the updated pattern
    async fn record_usage(&self, usage: PatternUsage) -> NodeResult<Pattern>;

    /// Usage rows for one pattern, oldest first
    async fn usage_log(&self, pattern_id: &PatternId) -> NodeResult<Vec<PatternUsage>>;

    /// Soft-delete patterns that stayed below the floor across the
    /// observation window, and drop already-soft-deleted ones; returns
    /// the ids touched in this pass
    async fn prune_stale_patterns(
        &self,
        retention_floor: f32,
        observation_min_usages: u64,
    ) -> NodeResult<Vec<PatternId>>;

    /// Record an event id as processed; returns `false` when the id was
    /// already present (duplicate delivery)
    async fn mark_processed(&self, event_id: EventId, processed_at: DateTime<Utc>)
        -> NodeResult<bool>;

    /// Check whether an event id was already processed
    async fn is_processed(&self, event_id: &EventId) -> NodeResult<bool>;

    /// Delete processed-event rows older than the cutoff; returns the
    /// number of rows deleted
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> NodeResult<usize>;

    /// Number of processed-event rows currently retained
    async fn processed_count(&self) -> NodeResult<usize>;
}

#[derive(Default)]
struct RelationalState {
    patterns: HashMap<PatternId, Pattern>,
    usage_log: Vec<PatternUsage>,
    processed_events: HashMap<EventId, DateTime<Utc>>,
}

/// Reference in-memory relational store
///
/// A single lock serializes counter updates, matching the row-level
/// locking the SQL binding relies on.
#[derive(Clone, Default)]
pub struct InMemoryPatternStore {
    state: Arc<RwLock<RelationalState>>,
}

impl InMemoryPatternStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> NodeError {
        NodeError::Internal("pattern store lock poisoned".into())
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn insert_pattern(&self, pattern: Pattern) -> NodeResult<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        state.patterns.insert(pattern.pattern_id, pattern);
        Ok(())
    }

    async fn get_pattern(&self, pattern_id: &PatternId) -> NodeResult<Option<Pattern>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state.patterns.get(pattern_id).cloned())
    }

    async fn active_patterns(&self, retention_floor: f32) -> NodeResult<Vec<Pattern>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        let mut patterns: Vec<Pattern> = state
            .patterns
            .values()
            .filter(|p| p.is_active(retention_floor))
            .cloned()
            .collect();
        patterns.sort_by(|a, b| a.pattern_id.0.cmp(&b.pattern_id.0));
        Ok(patterns)
    }

    async fn record_usage(&self, usage: PatternUsage) -> NodeResult<Pattern> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        let pattern = state.patterns.get_mut(&usage.pattern_id).ok_or_else(|| {
            NodeError::PreconditionViolated(format!(
                "usage recorded for unknown pattern `{}`",
                usage.pattern_id
            ))
        })?;

        // Counters only move when the pattern was actually replayed;
        // skipped offers are logged but do not affect the success rate.
        if usage.used {
            pattern.record_outcome(matches!(
                usage.outcome,
                crate::patterns::model::UsageOutcome::Success
            ));
        }
        let updated = pattern.clone();
        state.usage_log.push(usage);
        Ok(updated)
    }

    async fn usage_log(&self, pattern_id: &PatternId) -> NodeResult<Vec<PatternUsage>> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state
            .usage_log
            .iter()
            .filter(|u| &u.pattern_id == pattern_id)
            .cloned()
            .collect())
    }

    async fn prune_stale_patterns(
        &self,
        retention_floor: f32,
        observation_min_usages: u64,
    ) -> NodeResult<Vec<PatternId>> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        let mut touched = Vec::new();

        // Drop patterns soft-deleted in a previous pass.
        let stale: Vec<PatternId> = state
            .patterns
            .values()
            .filter(|p| !p.active)
            .map(|p| p.pattern_id)
            .collect();
        for id in stale {
            state.patterns.remove(&id);
            touched.push(id);
        }

        // Soft-delete patterns that stayed below the floor across the
        // observation window.
        for pattern in state.patterns.values_mut() {
            if pattern.usage_count >= observation_min_usages
                && pattern.success_rate() < retention_floor
            {
                pattern.active = false;
                touched.push(pattern.pattern_id);
            }
        }
        touched.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(touched)
    }

    async fn mark_processed(
        &self,
        event_id: EventId,
        processed_at: DateTime<Utc>,
    ) -> NodeResult<bool> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        match state.processed_events.entry(event_id) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(processed_at);
                Ok(true)
            }
        }
    }

    async fn is_processed(&self, event_id: &EventId) -> NodeResult<bool> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state.processed_events.contains_key(event_id))
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> NodeResult<usize> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        let before = state.processed_events.len();
        state.processed_events.retain(|_, at| *at >= cutoff);
        Ok(before - state.processed_events.len())
    }

    async fn processed_count(&self) -> NodeResult<usize> {
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        Ok(state.processed_events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::{CorrelationId, TraceId};
    use crate::patterns::model::{ExecutionPath, UsageOutcome};
    use chrono::Duration;

    fn pattern(initial: f32) -> Pattern {
        Pattern {
            pattern_id: PatternId::new(),
            source_trace_id: TraceId::new(),
            prompt_text: "fix the failing test".into(),
            prompt_embedding: vec![1.0, 0.0],
            intent: "fix".into(),
            keywords: ["fix", "test"].iter().map(|s| s.to_string()).collect(),
            execution_path: ExecutionPath {
                agent: "code-agent".into(),
                hook_types: vec!["pre_validate".into()],
                endpoint_paths: vec!["/api/analyze".into()],
            },
            performance_profile: None,
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            initial_score: initial,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn usage(pattern_id: PatternId, used: bool, outcome: UsageOutcome) -> PatternUsage {
        PatternUsage {
            pattern_id,
            correlation_id: CorrelationId::new(),
            match_score: 0.9,
            used,
            outcome,
            deviations: vec![],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn usage_updates_counters_atomically() {
        let store = InMemoryPatternStore::new();
        let p = pattern(0.8);
        let id = p.pattern_id;
        store.insert_pattern(p).await.unwrap();

        let updated = store
            .record_usage(usage(id, true, UsageOutcome::Success))
            .await
            .unwrap();
        assert_eq!(updated.usage_count, 1);
        assert_eq!(updated.success_count, 1);

        let updated = store
            .record_usage(usage(id, true, UsageOutcome::Failure))
            .await
            .unwrap();
        assert_eq!(updated.usage_count, 2);
        assert_eq!(updated.failure_count, 1);
        assert!((updated.success_rate() - 0.5).abs() < 1e-6);

        assert_eq!(store.usage_log(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn skipped_offers_are_logged_without_moving_counters() {
        let store = InMemoryPatternStore::new();
        let p = pattern(0.8);
        let id = p.pattern_id;
        store.insert_pattern(p).await.unwrap();

        let updated = store
            .record_usage(usage(id, false, UsageOutcome::Skipped))
            .await
            .unwrap();
        assert_eq!(updated.usage_count, 0);
        assert_eq!(store.usage_log(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn usage_for_unknown_pattern_is_a_precondition_violation() {
        let store = InMemoryPatternStore::new();
        let err = store
            .record_usage(usage(PatternId::new(), true, UsageOutcome::Success))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::PreconditionViolated(_)));
    }

    #[tokio::test]
    async fn concurrent_usage_has_no_lost_updates() {
        let store = InMemoryPatternStore::new();
        let p = pattern(0.8);
        let id = p.pattern_id;
        store.insert_pattern(p).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record_usage(usage(id, true, UsageOutcome::Success))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let final_pattern = store.get_pattern(&id).await.unwrap().unwrap();
        assert_eq!(final_pattern.usage_count, 16);
        assert_eq!(final_pattern.success_count, 16);
    }

    #[tokio::test]
    async fn duplicate_processed_event_is_seen_not_an_error() {
        let store = InMemoryPatternStore::new();
        let event_id = EventId::new();
        let now = Utc::now();

        assert!(store.mark_processed(event_id, now).await.unwrap());
        assert!(!store.mark_processed(event_id, now).await.unwrap());
        assert!(store.is_processed(&event_id).await.unwrap());
        assert_eq!(store.processed_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ttl_purge_deletes_exactly_the_expired_rows() {
        let store = InMemoryPatternStore::new();
        let now = Utc::now();
        let old = EventId::new();
        let fresh = EventId::new();

        store
            .mark_processed(old, now - Duration::days(8))
            .await
            .unwrap();
        store
            .mark_processed(fresh, now - Duration::hours(1))
            .await
            .unwrap();

        let deleted = store
            .purge_processed_before(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!store.is_processed(&old).await.unwrap());
        assert!(store.is_processed(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn purge_and_duplicate_delivery_keep_dedupe_correct() {
        let store = InMemoryPatternStore::new();
        let now = Utc::now();
        let event_id = EventId::new();
        store.mark_processed(event_id, now).await.unwrap();

        // A purge that does not cover this row must not break dedupe.
        store
            .purge_processed_before(now - Duration::days(7))
            .await
            .unwrap();
        assert!(!store.mark_processed(event_id, now).await.unwrap());
    }

    #[tokio::test]
    async fn pruning_soft_deletes_then_removes() {
        let store = InMemoryPatternStore::new();
        let mut bad = pattern(0.9);
        bad.usage_count = 5;
        bad.success_count = 0;
        bad.failure_count = 5;
        let bad_id = bad.pattern_id;

        let good = pattern(0.9);
        let good_id = good.pattern_id;

        store.insert_pattern(bad).await.unwrap();
        store.insert_pattern(good).await.unwrap();

        // First pass soft-deletes the stale pattern.
        let touched = store.prune_stale_patterns(0.3, 5).await.unwrap();
        assert_eq!(touched, vec![bad_id]);
        let stale = store.get_pattern(&bad_id).await.unwrap().unwrap();
        assert!(!stale.active);
        assert!(store
            .active_patterns(0.3)
            .await
            .unwrap()
            .iter()
            .all(|p| p.pattern_id != bad_id));

        // Second pass removes it.
        let touched = store.prune_stale_patterns(0.3, 5).await.unwrap();
        assert_eq!(touched, vec![bad_id]);
        assert!(store.get_pattern(&bad_id).await.unwrap().is_none());

        // The healthy pattern is untouched.
        assert!(store.get_pattern(&good_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn below_floor_without_observation_window_is_retained() {
        let store = InMemoryPatternStore::new();
        let mut young = pattern(0.9);
        young.usage_count = 2;
        young.failure_count = 2;
        let id = young.pattern_id;
        store.insert_pattern(young).await.unwrap();

        let touched = store.prune_stale_patterns(0.3, 5).await.unwrap();
        assert!(touched.is_empty());
        assert!(store.get_pattern(&id).await.unwrap().unwrap().active);
    }
}
