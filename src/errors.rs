// Copyright 2025 Cowboy AI, LLC.

//! Error taxonomy shared by every node in the pipeline
//!
//! The taxonomy is deliberately small: it is the contract between nodes,
//! the retry policy of the runtime, and the dead-letter routing of the
//! event layer. Effects map their dependency failures into it; Compute
//! nodes propagate it unchanged.

use crate::identifiers::CorrelationId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while executing a node operation
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// Input failed schema or precondition validation; never retried
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referential integrity or determinism violation; never retried
    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    /// Connection or I/O failure against an external dependency; retriable
    #[error("Transient dependency failure: {dependency} - {message}")]
    TransientDependencyFailure {
        /// Name of the dependency that failed
        dependency: String,
        /// Error message from the dependency
        message: String,
    },

    /// Non-retriable error from an external dependency
    #[error("Permanent dependency failure: {dependency} - {message}")]
    PermanentDependencyFailure {
        /// Name of the dependency that failed
        dependency: String,
        /// Error message from the dependency
        message: String,
    },

    /// Operation exceeded its declared deadline
    #[error("Timeout after {elapsed_ms}ms in {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Elapsed time when the deadline fired
        elapsed_ms: u64,
    },

    /// Unexpected invariant break; surfaced, never swallowed
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

impl From<serde_json::Error> for NodeError {
    fn from(err: serde_json::Error) -> Self {
        NodeError::InvalidInput(err.to_string())
    }
}

impl NodeError {
    /// Create a transient failure for a named dependency
    pub fn transient(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        NodeError::TransientDependencyFailure {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Create a permanent failure for a named dependency
    pub fn permanent(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        NodeError::PermanentDependencyFailure {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Check whether the runtime may retry this error
    pub fn is_retriable(&self) -> bool {
        matches!(self, NodeError::TransientDependencyFailure { .. })
    }

    /// Check whether this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout { .. })
    }

    /// Check whether this error should be routed to the dead-letter queue
    pub fn is_permanent(&self) -> bool {
        matches!(self, NodeError::PermanentDependencyFailure { .. })
    }

    /// Stable kind string used in failure events and API bodies
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::InvalidInput(_) => "invalid_input",
            NodeError::PreconditionViolated(_) => "precondition_violated",
            NodeError::TransientDependencyFailure { .. } => "transient_dependency_failure",
            NodeError::PermanentDependencyFailure { .. } => "permanent_dependency_failure",
            NodeError::Timeout { .. } => "timeout",
            NodeError::Internal(_) => "internal",
        }
    }

    /// Convert into the structured body carried by `processing.failed`
    /// events and synchronous error responses
    pub fn to_report(&self, correlation_id: CorrelationId) -> ErrorReport {
        ErrorReport {
            error_kind: self.kind().to_string(),
            message: self.to_string(),
            correlation_id,
        }
    }
}

/// Structured error body for failure events and synchronous surfaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorReport {
    /// Stable error kind
    pub error_kind: String,
    /// Human-readable message
    pub message: String,
    /// Correlation id of the failed workflow
    pub correlation_id: CorrelationId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_messages() {
        let err = NodeError::InvalidInput("missing field `files`".to_string());
        assert_eq!(err.to_string(), "Invalid input: missing field `files`");

        let err = NodeError::PreconditionViolated("relationship endpoint absent".to_string());
        assert_eq!(
            err.to_string(),
            "Precondition violated: relationship endpoint absent"
        );

        let err = NodeError::transient("qdrant", "connection refused");
        assert_eq!(
            err.to_string(),
            "Transient dependency failure: qdrant - connection refused"
        );

        let err = NodeError::permanent("neo4j", "authentication rejected");
        assert_eq!(
            err.to_string(),
            "Permanent dependency failure: neo4j - authentication rejected"
        );

        let err = NodeError::Timeout {
            operation: "vector.search".to_string(),
            elapsed_ms: 2000,
        };
        assert_eq!(err.to_string(), "Timeout after 2000ms in vector.search");

        let err = NodeError::Internal("pattern counters out of sync".to_string());
        assert_eq!(
            err.to_string(),
            "Internal error: pattern counters out of sync"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(NodeError::transient("bus", "broker unreachable").is_retriable());
        assert!(!NodeError::permanent("bus", "topic deleted").is_retriable());
        assert!(!NodeError::InvalidInput("x".into()).is_retriable());
        assert!(!NodeError::PreconditionViolated("x".into()).is_retriable());
        assert!(!NodeError::Internal("x".into()).is_retriable());
        assert!(!NodeError::Timeout {
            operation: "op".into(),
            elapsed_ms: 1
        }
        .is_retriable());
    }

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(NodeError::InvalidInput("x".into()).kind(), "invalid_input");
        assert_eq!(
            NodeError::PreconditionViolated("x".into()).kind(),
            "precondition_violated"
        );
        assert_eq!(
            NodeError::transient("d", "m").kind(),
            "transient_dependency_failure"
        );
        assert_eq!(
            NodeError::permanent("d", "m").kind(),
            "permanent_dependency_failure"
        );
        assert_eq!(
            NodeError::Timeout {
                operation: "op".into(),
                elapsed_ms: 1
            }
            .kind(),
            "timeout"
        );
        assert_eq!(NodeError::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn test_serde_json_conversion_is_invalid_input() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{ not json }").unwrap_err();
        let err: NodeError = serde_err.into();
        assert!(matches!(err, NodeError::InvalidInput(_)));
    }

    #[test]
    fn test_error_report_carries_correlation() {
        let correlation = CorrelationId(Uuid::new_v4());
        let report = NodeError::transient("kafka", "broker down").to_report(correlation);
        assert_eq!(report.error_kind, "transient_dependency_failure");
        assert_eq!(report.correlation_id, correlation);
        assert!(report.message.contains("broker down"));
    }

    #[test]
    fn test_all_errors_clone() {
        let errors: Vec<NodeError> = vec![
            NodeError::InvalidInput("test".to_string()),
            NodeError::PreconditionViolated("test".to_string()),
            NodeError::transient("dep", "msg"),
            NodeError::permanent("dep", "msg"),
            NodeError::Timeout {
                operation: "op".to_string(),
                elapsed_ms: 10,
            },
            NodeError::Internal("test".to_string()),
        ];
        for error in errors {
            let cloned = error.clone();
            assert_eq!(error.to_string(), cloned.to_string());
        }
    }
}
