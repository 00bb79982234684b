//! DeliveryQueue port - the broker subscription as seen by the consumer.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ConsumerError;

/// Broker-assigned identifier of one delivery.
///
/// Only valid on the channel that produced it and only until it is acked or
/// rejected; the consumer drops it once the delivery is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One message handed to the consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    /// Broker says this message was delivered before and not acked.
    pub redelivered: bool,
    pub received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(tag: DeliveryTag, body: Vec<u8>) -> Self {
        Self {
            tag,
            body,
            redelivered: false,
            received_at: Utc::now(),
        }
    }

    pub fn redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }
}

/// Manual-ack subscription to a single queue.
///
/// `recv` is the only suspension point of the consume loop. Deliveries that
/// are neither acked nor rejected stay in flight until the channel closes,
/// after which the broker requeues them.
#[async_trait]
pub trait DeliveryQueue: Send {
    /// Wait for the next delivery. `None` means the subscription ended.
    async fn recv(&mut self) -> Result<Option<Delivery>, ConsumerError>;

    /// Remove the delivery from the queue for good.
    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ConsumerError>;

    /// Negative-acknowledge. With `requeue = false` the broker routes the
    /// message to the queue's dead-letter exchange, if one is configured.
    async fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ConsumerError>;

    /// Tear the subscription down. Unsettled deliveries go back to the queue.
    async fn close(&mut self) {}
}
