//! Async mutation queue
//!
//! In-process broker over named topics. Publishing is fire-and-forget;
//! each topic has at most one consumer, which receives deliveries in
//! order. Redelivery (for at-least-once semantics) is driven by the
//! worker loop re-enqueuing a failed delivery with a bumped attempt
//! counter, so handlers must be idempotent.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Customer mutation intents
pub const CUSTOMER_DATA: &str = "customer_data";
/// Order mutation intents
pub const ORDER_DATA: &str = "order_data";
/// Campaign dispatch requests
pub const CAMPAIGN_DELIVERY: &str = "campaign_delivery";

/// Queue errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("topic '{0}' is closed")]
    Closed(String),

    #[error("topic '{0}' already has a consumer")]
    ConsumerAttached(String),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A message in flight
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub payload: Value,
    /// 1 on first delivery, bumped on each redelivery
    pub attempt: u32,
}

struct Topic {
    tx: UnboundedSender<Delivery>,
    rx: Option<UnboundedReceiver<Delivery>>,
}

impl Topic {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

/// In-process message broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    topics: Arc<Mutex<HashMap<String, Topic>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a payload to a topic. Topics are declared on first use;
    /// messages published before a consumer attaches are retained.
    pub fn publish(&self, topic: &str, payload: Value) -> Result<(), QueueError> {
        self.send(
            topic,
            Delivery {
                id: Uuid::new_v4(),
                payload,
                attempt: 1,
            },
        )
    }

    /// Serialize a payload and publish it
    pub fn publish_json<T: serde::Serialize>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<(), QueueError> {
        self.publish(topic, serde_json::to_value(payload)?)
    }

    /// Put a failed delivery back on its topic with the attempt bumped
    pub fn requeue(&self, topic: &str, mut delivery: Delivery) -> Result<(), QueueError> {
        delivery.attempt += 1;
        self.send(topic, delivery)
    }

    /// Take the consumer end of a topic. Single-consumer: the receiver
    /// can only be taken once.
    pub fn subscribe(&self, topic: &str) -> Result<UnboundedReceiver<Delivery>, QueueError> {
        let mut topics = self.topics.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(Topic::new);
        entry
            .rx
            .take()
            .ok_or_else(|| QueueError::ConsumerAttached(topic.to_string()))
    }

    fn send(&self, topic: &str, delivery: Delivery) -> Result<(), QueueError> {
        let mut topics = self.topics.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(Topic::new);
        entry
            .tx
            .send(delivery)
            .map_err(|_| QueueError::Closed(topic.to_string()))
    }
}
