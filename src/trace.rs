// Copyright 2025 Cowboy AI, LLC.

//! Execution traces - the raw material of pattern learning
//!
//! A trace records one execution chain: the prompt that started it, the
//! hooks that ran, and the endpoints that were called. Traces form a
//! tree via `parent_id`; the chain's root carries the root correlation.

use crate::identifiers::{CorrelationId, TraceId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of an execution trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TraceStatus {
    /// Execution is still running
    InProgress,
    /// Execution completed successfully
    Success,
    /// Execution failed with an error
    Error,
    /// Execution exceeded its deadline
    Timeout,
}

impl TraceStatus {
    /// Whether the trace has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TraceStatus::InProgress)
    }
}

/// One hook execution within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HookExecution {
    /// Hook type name
    pub hook_type: String,
    /// Whether the hook succeeded
    pub success: bool,
    /// Whether the hook is mandatory for the chain to count as successful
    pub mandatory: bool,
    /// Observed duration in milliseconds
    pub duration_ms: u64,
}

/// One endpoint call within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EndpointCall {
    /// Endpoint path
    pub path: String,
    /// Response status code
    pub status: u16,
    /// Observed latency in milliseconds
    pub latency_ms: u64,
}

impl EndpointCall {
    /// Whether the call completed without a server or client error
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// A recorded execution chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionTrace {
    /// Trace identifier
    pub trace_id: TraceId,
    /// Root correlation of the chain
    pub correlation_id: CorrelationId,
    /// Parent trace, absent for the chain root
    pub parent_id: Option<TraceId>,
    /// Session the chain ran in
    pub session_id: String,
    /// Agent that executed the chain
    pub agent: String,
    /// Prompt text that started the chain
    pub prompt_text: String,
    /// When execution started
    pub started_at: DateTime<Utc>,
    /// When execution completed, absent while in progress
    pub completed_at: Option<DateTime<Utc>>,
    /// Final status
    pub status: TraceStatus,
    /// Hooks that ran, in order
    pub hook_sequence: Vec<HookExecution>,
    /// Endpoints that were called, in order
    pub endpoint_calls: Vec<EndpointCall>,
}

impl ExecutionTrace {
    /// Whether this trace is the root of its chain
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Total observed duration, when the trace completed
    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at.map(|end| {
            (end - self.started_at)
                .num_milliseconds()
                .try_into()
                .unwrap_or(0)
        })
    }

    /// Ordered hook type names
    pub fn hook_types(&self) -> Vec<String> {
        self.hook_sequence
            .iter()
            .map(|h| h.hook_type.clone())
            .collect()
    }

    /// Ordered endpoint paths
    pub fn endpoint_paths(&self) -> Vec<String> {
        self.endpoint_calls.iter().map(|c| c.path.clone()).collect()
    }

    /// Whether every mandatory hook succeeded
    pub fn mandatory_hooks_succeeded(&self) -> bool {
        self.hook_sequence
            .iter()
            .filter(|h| h.mandatory)
            .all(|h| h.success)
    }

    /// Whether any hook or endpoint reported a failure
    pub fn has_errors(&self) -> bool {
        self.status == TraceStatus::Error
            || self.hook_sequence.iter().any(|h| !h.success)
            || self.endpoint_calls.iter().any(|c| !c.is_success())
    }

    /// Observed endpoint latencies in call order
    pub fn latencies_ms(&self) -> Vec<u64> {
        self.endpoint_calls.iter().map(|c| c.latency_ms).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_trace(status: TraceStatus) -> ExecutionTrace {
        let started = Utc::now();
        ExecutionTrace {
            trace_id: TraceId::new(),
            correlation_id: CorrelationId::new(),
            parent_id: None,
            session_id: "session-1".into(),
            agent: "code-agent".into(),
            prompt_text: "refactor the ingestion module".into(),
            started_at: started,
            completed_at: Some(started + Duration::milliseconds(1500)),
            status,
            hook_sequence: vec![
                HookExecution {
                    hook_type: "pre_validate".into(),
                    success: true,
                    mandatory: true,
                    duration_ms: 20,
                },
                HookExecution {
                    hook_type: "post_commit".into(),
                    success: true,
                    mandatory: false,
                    duration_ms: 35,
                },
            ],
            endpoint_calls: vec![
                EndpointCall {
                    path: "/api/intelligence/analyze".into(),
                    status: 200,
                    latency_ms: 120,
                },
                EndpointCall {
                    path: "/api/intelligence/store".into(),
                    status: 201,
                    latency_ms: 80,
                },
            ],
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TraceStatus::InProgress.is_terminal());
        assert!(TraceStatus::Success.is_terminal());
        assert!(TraceStatus::Error.is_terminal());
        assert!(TraceStatus::Timeout.is_terminal());
    }

    #[test]
    fn duration_and_sequences() {
        let trace = sample_trace(TraceStatus::Success);
        assert_eq!(trace.duration_ms(), Some(1500));
        assert_eq!(trace.hook_types(), vec!["pre_validate", "post_commit"]);
        assert_eq!(
            trace.endpoint_paths(),
            vec!["/api/intelligence/analyze", "/api/intelligence/store"]
        );
        assert_eq!(trace.latencies_ms(), vec![120, 80]);
    }

    #[test]
    fn mandatory_hook_failure_is_detected() {
        let mut trace = sample_trace(TraceStatus::Success);
        assert!(trace.mandatory_hooks_succeeded());
        trace.hook_sequence[0].success = false;
        assert!(!trace.mandatory_hooks_succeeded());
        assert!(trace.has_errors());
    }

    #[test]
    fn endpoint_error_is_detected() {
        let mut trace = sample_trace(TraceStatus::Success);
        assert!(!trace.has_errors());
        trace.endpoint_calls[1].status = 502;
        assert!(trace.has_errors());
    }

    #[test]
    fn root_traces_have_no_parent() {
        let mut trace = sample_trace(TraceStatus::Success);
        assert!(trace.is_root());
        trace.parent_id = Some(TraceId::new());
        assert!(!trace.is_root());
    }
}
