// Copyright 2025 Cowboy AI, LLC.

//! Event layer: envelopes, bus, publisher, consumer
//!
//! The bus owns envelopes; no node rewrites history. The publisher
//! retries, dead-letters, and circuit-breaks; the consumer deduplicates
//! by `event_id` before any side effect.

pub mod bus;
pub mod consumer;
pub mod envelope;
pub mod publisher;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use bus::{BusMessage, BusSubscription, InMemoryBus, MessageBus};
pub use consumer::{ConsumerAction, ConsumerConfig, EnvelopeHandler, EventConsumer};
pub use envelope::{
    versioned_event_type, DeadLetter, EventEnvelope, EventSource, TopicSpace,
};
pub use publisher::{requeue_dead_letter, EventPublisher, PublishOutcome, PublisherConfig};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBus, KafkaBusConfig};
