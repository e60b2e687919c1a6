// Copyright 2025 Cowboy AI, LLC.

//! Message bus abstraction
//!
//! The publisher and consumer speak to this trait; the in-memory bus
//! serves tests and local runs, the Kafka binding serves deployments.
//! Messages sharing a key land on the same partition and are delivered
//! to a subscriber in publish order; correctness never depends on
//! ordering across partitions.

use crate::errors::{NodeError, NodeResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A message as it travels on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published to
    pub topic: String,
    /// Partition key, when the producer supplied one
    pub key: Option<String>,
    /// Serialized envelope
    pub payload: Vec<u8>,
}

/// A subscription delivering messages in per-partition order
pub struct BusSubscription {
    receiver: mpsc::UnboundedReceiver<BusMessage>,
}

impl BusSubscription {
    /// Wrap a receiver fed by a bus implementation
    pub(crate) fn from_receiver(receiver: mpsc::UnboundedReceiver<BusMessage>) -> Self {
        Self { receiver }
    }

    /// Receive the next message; `None` when the bus shut down
    pub async fn next(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Receive without waiting; `None` when nothing is buffered
    pub fn try_next(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok()
    }

    /// Adapt the subscription into a [`futures::Stream`] of messages
    pub fn into_stream(self) -> tokio_stream::wrappers::UnboundedReceiverStream<BusMessage> {
        tokio_stream::wrappers::UnboundedReceiverStream::new(self.receiver)
    }
}

/// Bus operations
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish with acknowledged delivery
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> NodeResult<()>;

    /// Subscribe to a topic
    async fn subscribe(&self, topic: &str) -> NodeResult<BusSubscription>;
}

#[derive(Default)]
struct InMemoryBusState {
    log: HashMap<String, Vec<BusMessage>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>,
}

/// In-memory bus with a per-topic log
///
/// Single partition per topic, which makes publish order the delivery
/// order. Subscribers receive the backlog first, then live messages.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    state: Arc<Mutex<InMemoryBusState>>,
    fail_publishes: Arc<Mutex<u32>>,
}

impl InMemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail with a transient error
    pub fn fail_next_publishes(&self, n: u32) {
        *self.fail_publishes.lock().expect("bus lock") = n;
    }

    /// All messages published to a topic, in order
    pub fn messages(&self, topic: &str) -> Vec<BusMessage> {
        self.state
            .lock()
            .expect("bus lock")
            .log
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of messages published to a topic
    pub fn message_count(&self, topic: &str) -> usize {
        self.messages(topic).len()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> NodeResult<()> {
        {
            let mut failures = self.fail_publishes.lock().expect("bus lock");
            if *failures > 0 {
                *failures -= 1;
                return Err(NodeError::transient("bus", "injected publish failure"));
            }
        }

        let message = BusMessage {
            topic: topic.to_string(),
            key: key.map(str::to_string),
            payload,
        };

        let mut state = self.state.lock().expect("bus lock");
        state
            .log
            .entry(topic.to_string())
            .or_default()
            .push(message.clone());
        if let Some(senders) = state.subscribers.get_mut(topic) {
            senders.retain(|sender| sender.send(message.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> NodeResult<BusSubscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock().expect("bus lock");
        // Backlog first, then live delivery; order is preserved.
        if let Some(backlog) = state.log.get(topic) {
            for message in backlog {
                let _ = sender.send(message.clone());
            }
        }
        state
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(BusSubscription::from_receiver(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_order_is_delivery_order() {
        let bus = InMemoryBus::new();
        let mut subscription = bus.subscribe("t").await.unwrap();
        for i in 0..5u8 {
            bus.publish("t", Some("k"), vec![i]).await.unwrap();
        }
        for i in 0..5u8 {
            let message = subscription.next().await.unwrap();
            assert_eq!(message.payload, vec![i]);
        }
    }

    #[tokio::test]
    async fn late_subscribers_receive_the_backlog() {
        let bus = InMemoryBus::new();
        bus.publish("t", None, vec![1]).await.unwrap();
        bus.publish("t", None, vec![2]).await.unwrap();

        let mut subscription = bus.subscribe("t").await.unwrap();
        assert_eq!(subscription.next().await.unwrap().payload, vec![1]);
        assert_eq!(subscription.next().await.unwrap().payload, vec![2]);
    }

    #[test]
    fn injected_failures_are_transient() {
        tokio_test::block_on(async {
            let bus = InMemoryBus::new();
            bus.fail_next_publishes(1);
            let err = bus.publish("t", None, vec![]).await.unwrap_err();
            assert!(err.is_retriable());
            bus.publish("t", None, vec![]).await.unwrap();
            assert_eq!(bus.message_count("t"), 1);
        });
    }

    #[tokio::test]
    async fn subscription_converts_into_a_stream() {
        use tokio_stream::StreamExt;

        let bus = InMemoryBus::new();
        bus.publish("t", None, vec![7]).await.unwrap();
        let mut stream = bus.subscribe("t").await.unwrap().into_stream();
        assert_eq!(stream.next().await.unwrap().payload, vec![7]);
    }
}
