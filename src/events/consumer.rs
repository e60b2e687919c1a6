// Copyright 2025 Cowboy AI, LLC.

//! Event consumer Effect
//!
//! Per-envelope state machine:
//!
//! INIT -> DEDUPE_CHECK -> (SEEN -> ACK)
//!                       | (UNSEEN -> HANDLE -> (SUCCESS -> RECORD+ACK)
//!                                            | (TRANSIENT -> RETRY)
//!                                            | (PERMANENT -> DLQ+ACK))
//!
//! Side effects run at most once per `event_id`: the processed-events
//! table is consulted before handling and written after success.
//! Polling pauses when in-flight handlers reach the configured ceiling.

use crate::contract::RetryPolicy;
use crate::errors::{NodeError, NodeResult};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::bus::{BusSubscription, MessageBus};
use super::envelope::{DeadLetter, EventEnvelope, TopicSpace};
use crate::stores::relational::PatternStore;

/// Consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Retry policy for transient handler failures
    pub retry: RetryPolicy,
    /// Ceiling on concurrently running handlers
    pub max_in_flight: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_in_flight: 16,
        }
    }
}

/// What the consumer did with one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerAction {
    /// Duplicate delivery; acknowledged without side effects
    Skipped,
    /// Handled and recorded
    Processed,
    /// Routed to the dead-letter topic and acknowledged
    DeadLettered,
}

/// A typed envelope handler
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    /// Schema versions this handler can decode
    fn accepts(&self, schema_version: &str) -> bool;

    /// Process one envelope; side effects belong here
    async fn handle(&self, envelope: &EventEnvelope) -> NodeResult<()>;
}

/// Consumer wired to the dedupe store and the bus
pub struct EventConsumer {
    store: Arc<dyn PatternStore>,
    bus: Arc<dyn MessageBus>,
    config: ConsumerConfig,
    in_flight: Arc<Semaphore>,
}

impl EventConsumer {
    /// Wire a consumer
    pub fn new(
        store: Arc<dyn PatternStore>,
        bus: Arc<dyn MessageBus>,
        config: ConsumerConfig,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            store,
            bus,
            config,
            in_flight,
        }
    }

    /// Run the state machine for one envelope
    pub async fn handle_envelope(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
        handler: &dyn EnvelopeHandler,
    ) -> NodeResult<ConsumerAction> {
        // Back-pressure: wait for a handler slot before doing anything.
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| NodeError::Internal("consumer semaphore closed".into()))?;

        // DEDUPE_CHECK
        if self.store.is_processed(&envelope.event_id).await? {
            debug!(event_id = %envelope.event_id, "duplicate delivery, acknowledging");
            return Ok(ConsumerAction::Skipped);
        }

        // Schema selection by the envelope's declared version.
        if !handler.accepts(&envelope.schema_version) {
            let error = NodeError::permanent(
                "consumer",
                format!("unsupported schema version {}", envelope.schema_version),
            );
            self.dead_letter(topic, envelope, &error, 0).await?;
            return Ok(ConsumerAction::DeadLettered);
        }

        // HANDLE with bounded retry on transient errors.
        let mut attempt = 0u32;
        let error = loop {
            attempt += 1;
            match handler.handle(envelope).await {
                Ok(()) => {
                    // RECORD+ACK. A concurrent duplicate that won the
                    // insert race means this event is SEEN; never raise.
                    self.store
                        .mark_processed(envelope.event_id, Utc::now())
                        .await?;
                    info!(event_id = %envelope.event_id, "envelope processed");
                    return Ok(ConsumerAction::Processed);
                }
                Err(err) if err.is_retriable() && attempt < self.config.retry.max_attempts => {
                    warn!(event_id = %envelope.event_id, attempt, error = %err, "handler retry");
                    tokio::time::sleep(Duration::from_millis(self.config.retry.delay_ms(attempt)))
                        .await;
                }
                Err(err) => break err,
            }
        };

        // PERMANENT (or exhausted) -> DLQ+ACK
        self.dead_letter(topic, envelope, &error, attempt).await?;
        Ok(ConsumerAction::DeadLettered)
    }

    /// Drain everything currently buffered on a subscription
    pub async fn drain(
        &self,
        subscription: &mut BusSubscription,
        topic: &str,
        handler: &dyn EnvelopeHandler,
    ) -> NodeResult<Vec<ConsumerAction>> {
        let mut actions = Vec::new();
        while let Some(message) = subscription.try_next() {
            let envelope: EventEnvelope = serde_json::from_slice(&message.payload)?;
            actions.push(self.handle_envelope(topic, &envelope, handler).await?);
        }
        Ok(actions)
    }

    async fn dead_letter(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
        error: &NodeError,
        retry_count: u32,
    ) -> NodeResult<()> {
        let dead_letter = DeadLetter {
            original: envelope.clone(),
            error: error.to_string(),
            retry_count,
            failed_at: Utc::now(),
        };
        let dlq_topic = TopicSpace::dlq(topic);
        warn!(topic = dlq_topic, event_id = %envelope.event_id, "dead-lettering envelope");
        self.bus
            .publish(
                &dlq_topic,
                Some(&envelope.correlation_id.to_string()),
                serde_json::to_vec(&dead_letter)?,
            )
            .await
    }
}
