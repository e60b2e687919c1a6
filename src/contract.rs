// Copyright 2025 Cowboy AI, LLC.

//! Node contracts
//!
//! Every node declares a contract: its kind, version, operation table,
//! and (for Effects) the external dependencies it touches. The runtime
//! dispatches by operation name and enforces the declared timeout and
//! retry policy. New operations are added by contract extension, never
//! by runtime patching.

use indexmap::IndexMap;
use schemars::gen::SchemaGenerator;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four node kinds, distinguished by side-effect discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Pure transform of typed input to typed output; no I/O
    Compute,
    /// Performs I/O against one external store or bus
    Effect,
    /// Aggregates ordered inputs into persisted state
    Reducer,
    /// Composes nodes into workflows via a declarative contract
    Orchestrator,
}

impl NodeKind {
    /// Whether nodes of this kind may suspend on I/O
    pub fn may_suspend(&self) -> bool {
        !matches!(self, NodeKind::Compute)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Compute => "compute",
            NodeKind::Effect => "effect",
            NodeKind::Reducer => "reducer",
            NodeKind::Orchestrator => "orchestrator",
        };
        write!(f, "{name}")
    }
}

/// Retry policy for retriable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub base_delay_ms: u64,
    /// Ceiling on the backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Exponential backoff delay before the given retry (1-based),
    /// without jitter; the runtime adds jitter on top
    pub fn delay_ms(&self, retry: u32) -> u64 {
        if retry == 0 {
            return 0;
        }
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms)
    }
}

/// External dependency kinds an Effect may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Graph store holding entities and relationships
    GraphStore,
    /// Vector store holding chunk embeddings
    VectorStore,
    /// Relational store holding patterns and processed events
    RelationalStore,
    /// The event bus
    Bus,
    /// The remote embedding provider
    EmbeddingProvider,
}

/// A declared external dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DependencyDescriptor {
    /// Dependency name as wired at construction
    pub name: String,
    /// Kind of dependency
    pub kind: DependencyKind,
}

/// One operation in a node's contract
#[derive(Debug, Clone)]
pub struct OperationSpec {
    /// Operation name, the dispatch key
    pub name: String,
    /// JSON schema of the input
    pub input_schema: RootSchema,
    /// JSON schema of the output
    pub output_schema: RootSchema,
    /// Deadline for one execution attempt
    pub timeout_ms: u64,
    /// Retry policy for retriable failures
    pub retry: RetryPolicy,
    /// Input field acting as the idempotency key, when the operation is
    /// idempotent; Effects without one are never retried on timeout
    pub idempotency_key: Option<String>,
}

impl OperationSpec {
    /// Declare an operation with schemas derived from its typed
    /// input and output
    pub fn new<I: JsonSchema, O: JsonSchema>(name: impl Into<String>) -> Self {
        let mut generator = SchemaGenerator::default();
        let input_schema = generator.root_schema_for::<I>();
        let output_schema = generator.root_schema_for::<O>();
        Self {
            name: name.into(),
            input_schema,
            output_schema,
            timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            idempotency_key: None,
        }
    }

    /// Set the per-attempt timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Declare the idempotency key field
    pub fn with_idempotency_key(mut self, field: impl Into<String>) -> Self {
        self.idempotency_key = Some(field.into());
        self
    }

    /// Top-level fields the input schema requires
    pub fn required_input_fields(&self) -> Vec<String> {
        required_fields(&self.input_schema)
    }

    /// Top-level fields the output schema requires
    pub fn required_output_fields(&self) -> Vec<String> {
        required_fields(&self.output_schema)
    }
}

fn required_fields(schema: &RootSchema) -> Vec<String> {
    schema
        .schema
        .object
        .as_ref()
        .map(|o| o.required.iter().cloned().collect())
        .unwrap_or_default()
}

/// A node's declared contract
#[derive(Debug, Clone)]
pub struct NodeContract {
    /// Node name
    pub name: String,
    /// Node kind
    pub kind: NodeKind,
    /// Contract version
    pub version: String,
    /// Operations, keyed by name in declaration order
    pub operations: IndexMap<String, OperationSpec>,
    /// External dependencies, for Effects
    pub dependencies: Vec<DependencyDescriptor>,
}

impl NodeContract {
    /// Create a contract with an empty operation table
    pub fn new(name: impl Into<String>, kind: NodeKind, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            version: version.into(),
            operations: IndexMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Add an operation
    pub fn with_operation(mut self, spec: OperationSpec) -> Self {
        self.operations.insert(spec.name.clone(), spec);
        self
    }

    /// Declare an external dependency
    pub fn with_dependency(mut self, name: impl Into<String>, kind: DependencyKind) -> Self {
        self.dependencies.push(DependencyDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    /// Look up an operation by name
    pub fn operation(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Serialize, Deserialize, JsonSchema)]
    struct EchoInput {
        text: String,
        repeat: Option<u32>,
    }

    #[derive(Serialize, Deserialize, JsonSchema)]
    struct EchoOutput {
        text: String,
    }

    #[test]
    fn compute_nodes_do_not_suspend() {
        assert!(!NodeKind::Compute.may_suspend());
        assert!(NodeKind::Effect.may_suspend());
        assert!(NodeKind::Reducer.may_suspend());
        assert!(NodeKind::Orchestrator.may_suspend());
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_ms(0), 0);
        assert_eq!(policy.delay_ms(1), 100);
        assert_eq!(policy.delay_ms(2), 200);
        assert_eq!(policy.delay_ms(3), 400);
        assert_eq!(policy.delay_ms(4), 800);
        assert_eq!(policy.delay_ms(5), 1_000);
        assert_eq!(policy.delay_ms(30), 1_000);
    }

    #[test]
    fn no_retry_policy() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_ms(1), 0);
    }

    #[test]
    fn operation_schema_captures_required_fields() {
        let spec = OperationSpec::new::<EchoInput, EchoOutput>("echo");
        assert_eq!(spec.required_input_fields(), vec!["text".to_string()]);
        assert_eq!(spec.required_output_fields(), vec!["text".to_string()]);
    }

    #[test]
    fn contract_dispatch_table_preserves_order() {
        let contract = NodeContract::new("demo", NodeKind::Effect, "1.0.0")
            .with_operation(OperationSpec::new::<EchoInput, EchoOutput>("second_op"))
            .with_operation(OperationSpec::new::<EchoInput, EchoOutput>("first_op"))
            .with_dependency("graph", DependencyKind::GraphStore);

        let names: Vec<&str> = contract.operations.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["second_op", "first_op"]);
        assert!(contract.operation("first_op").is_some());
        assert!(contract.operation("missing").is_none());
        assert_eq!(contract.dependencies[0].kind, DependencyKind::GraphStore);
    }

    #[test]
    fn idempotency_key_marks_retriable_timeouts() {
        let spec = OperationSpec::new::<EchoInput, EchoOutput>("upsert")
            .with_idempotency_key("chunk_id");
        assert_eq!(spec.idempotency_key.as_deref(), Some("chunk_id"));
    }
}
