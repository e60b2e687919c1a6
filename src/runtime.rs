// Copyright 2025 Cowboy AI, LLC.

//! Node runtime - dispatch, validation, timeout, retry
//!
//! The runtime is the only place that retries. Effects declare what is
//! retriable through their contract; Compute nodes are deterministic
//! and are executed exactly once.

use crate::contract::{NodeContract, NodeKind, OperationSpec};
use crate::errors::{NodeError, NodeResult};
use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// A dispatchable node
///
/// Implementations expose their contract and execute operations over
/// JSON values. Typed nodes usually deserialize the input at the top of
/// `execute` and serialize the output at the bottom.
#[async_trait]
pub trait Node: Send + Sync {
    /// The node's declared contract
    fn contract(&self) -> &NodeContract;

    /// Execute one operation
    async fn execute(&self, operation: &str, input: Value) -> NodeResult<Value>;
}

/// Dispatches operations against nodes, enforcing their contracts
#[derive(Debug, Clone, Default)]
pub struct NodeRuntime;

impl NodeRuntime {
    /// Create a runtime
    pub fn new() -> Self {
        Self
    }

    /// Dispatch an operation: validate input, execute under the declared
    /// timeout, retry per policy, validate output
    pub async fn dispatch(
        &self,
        node: &dyn Node,
        operation: &str,
        input: Value,
    ) -> NodeResult<Value> {
        let contract = node.contract();
        let spec = contract.operation(operation).ok_or_else(|| {
            NodeError::InvalidInput(format!(
                "unknown operation `{operation}` on node `{}`",
                contract.name
            ))
        })?;

        validate_shape(spec.required_input_fields(), &input, "input")?;

        let output = self
            .execute_with_policy(node, contract.kind, spec, operation, input)
            .await?;

        validate_shape(spec.required_output_fields(), &output, "output")?;
        Ok(output)
    }

    async fn execute_with_policy(
        &self,
        node: &dyn Node,
        kind: NodeKind,
        spec: &OperationSpec,
        operation: &str,
        input: Value,
    ) -> NodeResult<Value> {
        let max_attempts = if kind == NodeKind::Compute {
            1
        } else {
            spec.retry.max_attempts.max(1)
        };
        let mut timeout_retried = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let started = std::time::Instant::now();
            let result = tokio::time::timeout(
                Duration::from_millis(spec.timeout_ms),
                node.execute(operation, input.clone()),
            )
            .await;

            let error = match result {
                Ok(Ok(output)) => {
                    debug!(
                        node = %node.contract().name,
                        operation,
                        attempt,
                        "operation completed"
                    );
                    return Ok(output);
                }
                Ok(Err(err)) => err,
                Err(_) => NodeError::Timeout {
                    operation: format!("{}.{}", node.contract().name, operation),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                },
            };

            let retry = match &error {
                NodeError::TransientDependencyFailure { .. } => attempt < max_attempts,
                // Timeouts are retried once, and only for idempotent Effects.
                NodeError::Timeout { .. } => {
                    let idempotent = spec.idempotency_key.is_some();
                    let allowed = kind == NodeKind::Effect && idempotent && !timeout_retried;
                    timeout_retried = timeout_retried || allowed;
                    allowed
                }
                _ => false,
            };

            if !retry {
                return Err(error);
            }

            let delay = jittered_delay_ms(spec.retry.delay_ms(attempt), spec.retry.base_delay_ms);
            warn!(
                node = %node.contract().name,
                operation,
                attempt,
                delay_ms = delay,
                error = %error,
                "retrying after retriable failure"
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

/// Backoff delay plus bounded random jitter
fn jittered_delay_ms(delay_ms: u64, base_delay_ms: u64) -> u64 {
    let jitter_ceiling = (base_delay_ms / 2).max(1);
    delay_ms + rand::thread_rng().gen_range(0..jitter_ceiling)
}

fn validate_shape(required: Vec<String>, value: &Value, direction: &str) -> NodeResult<()> {
    if required.is_empty() {
        return Ok(());
    }
    let object = value.as_object().ok_or_else(|| {
        NodeError::InvalidInput(format!("{direction} must be a JSON object"))
    })?;
    for field in required {
        if !object.contains_key(&field) {
            return Err(NodeError::InvalidInput(format!(
                "{direction} missing required field `{field}`"
            )));
        }
    }
    Ok(())
}
