// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::realtime::{FanOut, Room};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
// endregion: --- Imports

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
    brokers: String,
}

impl KafkaProducer {
    pub fn new(brokers: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
            brokers: brokers.to_string(),
        })
    }

    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), String> {
        debug!(
            "{:<12} --> Kafka send: topic={}, key={}",
            "Producer", topic, key
        );
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| format!("Error sending message: {:?}", e))?;

        Ok(())
    }

    /// Creates `topic`; an already existing topic is reported by the broker
    /// per topic and only logged.
    pub async fn create_topic(
        &self,
        topic: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), String> {
        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| format!("AdminClient creation failed: {:?}", e))?;

        let new_topic = NewTopic::new(
            topic,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        let results = admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| {
                error!("{:<12} --> Topic creation failed: {:?}", "Producer", e);
                format!("Topic creation failed: {:?}", e)
            })?;
        for result in results {
            match result {
                Ok(name) => info!("{:<12} --> Topic created: {}", "Producer", name),
                Err((name, code)) => info!("{:<12} --> Topic {}: {:?}", "Producer", name, code),
            }
        }
        Ok(())
    }
}
// endregion: --- Kafka Producer

// region:    --- Kafka Fan-out
/// Mirrors every fan-out event to a Kafka topic keyed by room, for
/// consumers outside this process.
pub struct KafkaFanOut {
    producer: KafkaProducer,
    topic: String,
}

impl KafkaFanOut {
    pub fn new(producer: KafkaProducer, topic: &str) -> Self {
        Self {
            producer,
            topic: topic.to_string(),
        }
    }
}

#[async_trait]
impl FanOut for KafkaFanOut {
    async fn publish(&self, room: &Room, event: &AuctionEvent) {
        let key = room.to_string();
        let payload = json!({ "room": key, "event": event }).to_string();
        if let Err(e) = self.producer.send_message(&self.topic, &key, &payload).await {
            error!(
                "{:<12} --> Could not mirror {} to Kafka: {}",
                "Producer",
                event.name(),
                e
            );
        }
    }
}
// endregion: --- Kafka Fan-out
