// Copyright 2025 Cowboy AI, LLC.

//! Event envelopes and topic naming
//!
//! Every payload on the bus travels inside an envelope. Envelopes are
//! append-only: no node rewrites bus history. Event types are
//! namespaced and carry a `.vN` version suffix; topics follow
//! `<env>.<owner>.<domain>.<event-type>.<version>` with `.dlq` appended
//! for dead letters.

use crate::identifiers::{CorrelationId, EventId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Originating service and instance of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EventSource {
    /// Service name
    pub service: String,
    /// Instance identifier
    pub instance_id: String,
}

/// The wrapper around every event payload on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EventEnvelope {
    /// Unique envelope id, the consumer's idempotency key
    pub event_id: EventId,
    /// Namespaced event type with a `.vN` suffix
    pub event_type: String,
    /// Schema version of the payload, a semver string
    pub schema_version: String,
    /// When the envelope was created
    pub timestamp: DateTime<Utc>,
    /// Correlation across the workflow
    pub correlation_id: CorrelationId,
    /// Producing service
    pub source: EventSource,
    /// Free metadata
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// The event payload, typed per `event_type`
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap a payload in a new envelope
    pub fn new(
        event_type: impl Into<String>,
        schema_version: impl Into<String>,
        correlation_id: CorrelationId,
        source: EventSource,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            schema_version: schema_version.into(),
            timestamp: Utc::now(),
            correlation_id,
            source,
            metadata: BTreeMap::new(),
            payload,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }

    /// The version number carried by the event type's `.vN` suffix
    pub fn type_version(&self) -> Option<u32> {
        self.event_type
            .rsplit('.')
            .next()
            .and_then(|tail| tail.strip_prefix('v'))
            .and_then(|n| n.parse().ok())
    }

    /// Serialized payload size in bytes
    pub fn payload_bytes(&self) -> usize {
        serde_json::to_vec(&self.payload).map(|v| v.len()).unwrap_or(0)
    }
}

/// Build a versioned event type name, e.g. `ingestion.requested.v2`
pub fn versioned_event_type(base: &str, version: u32) -> String {
    format!("{base}.v{version}")
}

/// Topic naming scheme: `<env>.<owner>.<domain>.<event-type>.<version>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TopicSpace {
    /// Deployment environment, e.g. `dev`
    pub env: String,
    /// Owning team or system
    pub owner: String,
    /// Business domain
    pub domain: String,
}

impl TopicSpace {
    /// Full topic name for a versioned event type
    pub fn topic(&self, event_type: &str, version: u32) -> String {
        format!(
            "{}.{}.{}.{event_type}.v{version}",
            self.env, self.owner, self.domain
        )
    }

    /// Dead-letter companion of a topic
    pub fn dlq(topic: &str) -> String {
        format!("{topic}.dlq")
    }
}

/// Envelope routed to a dead-letter topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeadLetter {
    /// The original envelope, embedded unchanged
    pub original: EventEnvelope,
    /// Description of the terminal error
    pub error: String,
    /// Attempts made before dead-lettering
    pub retry_count: u32,
    /// When the envelope was dead-lettered
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> EventSource {
        EventSource {
            service: "intelligence".into(),
            instance_id: "node-1".into(),
        }
    }

    #[test]
    fn envelope_ids_are_unique() {
        let a = EventEnvelope::new(
            "ingestion.requested.v2",
            "2.0.0",
            CorrelationId::new(),
            source(),
            serde_json::json!({}),
        );
        let b = EventEnvelope::new(
            "ingestion.requested.v2",
            "2.0.0",
            CorrelationId::new(),
            source(),
            serde_json::json!({}),
        );
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn type_version_parses_the_suffix() {
        let envelope = EventEnvelope::new(
            versioned_event_type("intelligence.processing.completed", 2),
            "2.1.0",
            CorrelationId::new(),
            source(),
            serde_json::json!({}),
        );
        assert_eq!(
            envelope.event_type,
            "intelligence.processing.completed.v2"
        );
        assert_eq!(envelope.type_version(), Some(2));
    }

    #[test]
    fn topic_naming_follows_the_scheme() {
        let space = TopicSpace {
            env: "dev".into(),
            owner: "omni".into(),
            domain: "intelligence".into(),
        };
        let topic = space.topic("ingestion.requested", 2);
        assert_eq!(topic, "dev.omni.intelligence.ingestion.requested.v2");
        assert_eq!(
            TopicSpace::dlq(&topic),
            "dev.omni.intelligence.ingestion.requested.v2.dlq"
        );
    }

    #[test]
    fn envelope_serde_roundtrip() {
        let envelope = EventEnvelope::new(
            "a.b.v1",
            "1.0.0",
            CorrelationId::new(),
            source(),
            serde_json::json!({"files": []}),
        )
        .with_metadata("origin", "test");
        let json = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn payload_bytes_measures_the_serialized_payload() {
        let envelope = EventEnvelope::new(
            "a.b.v1",
            "1.0.0",
            CorrelationId::new(),
            source(),
            serde_json::json!({"content": "xxxx"}),
        );
        assert!(envelope.payload_bytes() >= 18);
    }
}
