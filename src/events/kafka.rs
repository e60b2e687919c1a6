// Copyright 2025 Cowboy AI, LLC.

//! Kafka bus binding (rskafka)
//!
//! Pure-Rust Kafka client. Publishes hash the partition key so that one
//! correlation stays on one partition; subscriptions poll a partition
//! from its earliest offset and feed the shared subscription channel.

use crate::errors::{NodeError, NodeResult};
use async_trait::async_trait;
use rskafka::client::partition::{Compression, OffsetAt, UnknownTopicHandling};
use rskafka::client::{Client, ClientBuilder};
use rskafka::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

use super::bus::{BusMessage, BusSubscription, MessageBus};

/// Kafka connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaBusConfig {
    /// Bootstrap broker addresses
    pub brokers: Vec<String>,
    /// Partitions assumed per topic when hashing keys
    pub partitions_per_topic: i32,
    /// Max wait per fetch poll, in milliseconds
    pub fetch_max_wait_ms: i32,
    /// Max bytes per fetch poll
    pub fetch_max_bytes: i32,
}

impl Default for KafkaBusConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            partitions_per_topic: 1,
            fetch_max_wait_ms: 500,
            fetch_max_bytes: 1024 * 1024,
        }
    }
}

/// Bus implementation over rskafka
pub struct KafkaBus {
    client: Arc<Client>,
    config: KafkaBusConfig,
}

impl KafkaBus {
    /// Connect to the brokers
    pub async fn connect(config: KafkaBusConfig) -> NodeResult<Self> {
        let client = ClientBuilder::new(config.brokers.clone())
            .build()
            .await
            .map_err(|e| NodeError::transient("kafka", e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    fn partition_for(&self, key: Option<&str>) -> i32 {
        match key {
            None => 0,
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.config.partitions_per_topic.max(1) as u64) as i32
            }
        }
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> NodeResult<()> {
        let partition = self.partition_for(key);
        let partition_client = self
            .client
            .partition_client(topic, partition, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| NodeError::transient("kafka", e.to_string()))?;

        let record = Record {
            key: key.map(|k| k.as_bytes().to_vec()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: time::OffsetDateTime::now_utc(),
        };

        partition_client
            .produce(vec![record], Compression::default())
            .await
            .map_err(|e| NodeError::transient("kafka", e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> NodeResult<BusSubscription> {
        let partition_client = self
            .client
            .partition_client(topic, 0, UnknownTopicHandling::Retry)
            .await
            .map_err(|e| NodeError::transient("kafka", e.to_string()))?;

        let mut offset = partition_client
            .get_offset(OffsetAt::Earliest)
            .await
            .map_err(|e| NodeError::transient("kafka", e.to_string()))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let topic = topic.to_string();
        let max_wait = self.config.fetch_max_wait_ms;
        let max_bytes = self.config.fetch_max_bytes;

        tokio::spawn(async move {
            loop {
                match partition_client
                    .fetch_records(offset, 1..max_bytes, max_wait)
                    .await
                {
                    Ok((records, _high_watermark)) => {
                        for record_and_offset in records {
                            offset = record_and_offset.offset + 1;
                            let record = record_and_offset.record;
                            let message = BusMessage {
                                topic: topic.clone(),
                                key: record
                                    .key
                                    .and_then(|k| String::from_utf8(k).ok()),
                                payload: record.value.unwrap_or_default(),
                            };
                            if sender.send(message).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(topic, error = %err, "kafka fetch failed, backing off");
                        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    }
                }
            }
        });

        Ok(BusSubscription::from_receiver(receiver))
    }
}
