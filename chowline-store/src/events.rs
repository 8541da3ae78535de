use async_trait::async_trait;
use chowline_core::order::{Notifier, OrderStatus};
use chowline_core::{DeliveryError, DeliveryResult};
use chowline_shared::models::events::OrderUpdateEvent;
use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Hands order updates to the notification service over Kafka, keyed by
/// order id so one order's updates stay in sequence.
#[derive(Clone)]
pub struct KafkaNotifier {
    producer: EventProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer, topic: impl Into<String>) -> Self {
        Self { producer, topic: topic.into() }
    }
}

pub fn order_update_event(user_id: Uuid, order_id: Uuid, status: OrderStatus, message: &str) -> OrderUpdateEvent {
    OrderUpdateEvent {
        user_id,
        order_id,
        status: status.as_str().to_string(),
        message: message.to_string(),
        timestamp: Utc::now().timestamp(),
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn send_order_update(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        status: OrderStatus,
        message: &str,
    ) -> DeliveryResult<()> {
        let event = order_update_event(user_id, order_id, status, message);
        let payload = serde_json::to_string(&event)?;

        self.producer
            .publish(&self.topic, &order_id.to_string(), &payload)
            .await
            .map_err(|e| DeliveryError::Storage(format!("notification publish failed: {e}")))
    }
}
