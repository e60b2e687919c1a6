// Copyright 2025 Cowboy AI, LLC.

//! Event publisher Effect
//!
//! Wraps payloads in envelopes and publishes with acknowledged
//! delivery. Transient failures retry with bounded exponential backoff
//! and jitter; persistent failures route the envelope to the topic's
//! `.dlq` companion with the original embedded. A circuit breaker opens
//! after a run of consecutive failures and fails fast until the
//! cool-down elapses.

use crate::contract::RetryPolicy;
use crate::errors::{NodeError, NodeResult};
use crate::identifiers::CorrelationId;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::bus::MessageBus;
use super::envelope::{DeadLetter, EventEnvelope, EventSource, TopicSpace};

/// Publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Retry policy for transient bus failures
    pub retry: RetryPolicy,
    /// Consecutive failures that open the circuit breaker
    pub breaker_threshold: u32,
    /// Cool-down before the breaker closes again, in milliseconds
    pub breaker_cooldown_ms: u64,
    /// Ceiling on one envelope's serialized payload, in bytes
    pub max_payload_bytes: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            breaker_threshold: 5,
            breaker_cooldown_ms: 30_000,
            max_payload_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Where a publish attempt ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Delivered to the main topic
    Delivered,
    /// Routed to the dead-letter topic
    DeadLettered,
}

struct Breaker {
    consecutive_failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
        }
    }

    fn check(&self) -> NodeResult<()> {
        let mut open_until = self.open_until.lock().expect("breaker lock");
        if let Some(until) = *open_until {
            if Instant::now() < until {
                return Err(NodeError::transient("bus", "circuit breaker open"));
            }
            // Cool-down elapsed; half-open, allow the next attempt.
            *open_until = None;
        }
        Ok(())
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn record_failure(&self, threshold: u32, cooldown: Duration) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= threshold {
            let mut open_until = self.open_until.lock().expect("breaker lock");
            *open_until = Some(Instant::now() + cooldown);
        }
    }
}

/// Publisher over a message bus
pub struct EventPublisher {
    bus: Arc<dyn MessageBus>,
    source: EventSource,
    topics: TopicSpace,
    config: PublisherConfig,
    breaker: Breaker,
}

impl EventPublisher {
    /// Wire a publisher to its bus
    pub fn new(
        bus: Arc<dyn MessageBus>,
        source: EventSource,
        topics: TopicSpace,
        config: PublisherConfig,
    ) -> Self {
        Self {
            bus,
            source,
            topics,
            config,
            breaker: Breaker::new(),
        }
    }

    /// The topic space this publisher writes into
    pub fn topics(&self) -> &TopicSpace {
        &self.topics
    }

    /// Wrap a payload and publish it
    ///
    /// Returns the envelope actually published together with where it
    /// ended up.
    pub async fn publish(
        &self,
        event_type: &str,
        version: u32,
        correlation_id: CorrelationId,
        payload: serde_json::Value,
    ) -> NodeResult<(EventEnvelope, PublishOutcome)> {
        let envelope = EventEnvelope::new(
            super::envelope::versioned_event_type(event_type, version),
            format!("{version}.0.0"),
            correlation_id,
            self.source.clone(),
            payload,
        );
        let outcome = self.publish_envelope(event_type, version, &envelope).await?;
        Ok((envelope, outcome))
    }

    /// Publish an already-built envelope
    pub async fn publish_envelope(
        &self,
        event_type: &str,
        version: u32,
        envelope: &EventEnvelope,
    ) -> NodeResult<PublishOutcome> {
        if envelope.payload_bytes() > self.config.max_payload_bytes {
            return Err(NodeError::InvalidInput(format!(
                "payload exceeds the {} byte publish ceiling",
                self.config.max_payload_bytes
            )));
        }

        self.breaker.check()?;

        let topic = self.topics.topic(event_type, version);
        let bytes = serde_json::to_vec(envelope)?;
        let key = envelope.correlation_id.to_string();

        let mut attempt = 0u32;
        let error = loop {
            attempt += 1;
            match self.bus.publish(&topic, Some(&key), bytes.clone()).await {
                Ok(()) => {
                    self.breaker.record_success();
                    info!(topic, event_id = %envelope.event_id, "envelope published");
                    return Ok(PublishOutcome::Delivered);
                }
                Err(err) if err.is_retriable() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_ms(attempt)
                        + rand::thread_rng().gen_range(0..=self.config.retry.base_delay_ms.max(1) / 2);
                    warn!(topic, attempt, error = %err, "publish retry");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => break err,
            }
        };

        self.breaker.record_failure(
            self.config.breaker_threshold,
            Duration::from_millis(self.config.breaker_cooldown_ms),
        );

        // Persistent failure: route to the dead-letter companion.
        self.dead_letter(&topic, envelope, &error, attempt).await?;
        Ok(PublishOutcome::DeadLettered)
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
        let bytes = serde_json::to_vec(&dead_letter)?;
        let key = envelope.correlation_id.to_string();
        warn!(topic = dlq_topic, event_id = %envelope.event_id, "routing envelope to dead letter queue");
        self.bus.publish(&dlq_topic, Some(&key), bytes).await
    }
}

/// Re-publish a dead-lettered envelope back onto its main topic
///
/// Operator tooling for replaying after the underlying fault is fixed.
pub async fn requeue_dead_letter(
    bus: &dyn MessageBus,
    dlq_topic: &str,
    dead_letter: &DeadLetter,
) -> NodeResult<()> {
    let main_topic = dlq_topic.strip_suffix(".dlq").ok_or_else(|| {
        NodeError::InvalidInput(format!("`{dlq_topic}` is not a dead-letter topic"))
    })?;
    let bytes = serde_json::to_vec(&dead_letter.original)?;
    let key = dead_letter.original.correlation_id.to_string();
    bus.publish(main_topic, Some(&key), bytes).await
}
