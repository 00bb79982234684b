//! InMemoryDeliveryQueue - channel-fed queue for tests and dry runs.
//!
//! Mirrors the broker contract closely enough to exercise the consumer:
//! every delivery gets a fresh tag, ack/reject are only valid once per tag,
//! a requeued message comes back with a new tag and `redelivered` set, and a
//! prefetch limit stops delivery while that many messages are unsettled.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::error::ConsumerError;
use crate::ports::{Delivery, DeliveryQueue, DeliveryTag};

#[derive(Debug, Default)]
struct Ledger {
    /// Delivered, not yet settled (tag -> body, kept for requeue).
    in_flight: BTreeMap<DeliveryTag, Vec<u8>>,
    acked: Vec<DeliveryTag>,
    rejected: Vec<(DeliveryTag, bool)>,
}

#[derive(Debug)]
struct Shared {
    ledger: Mutex<Ledger>,
    next_tag: AtomicU64,
    fail_acks: AtomicBool,
}

impl Shared {
    fn allocate_tag(&self) -> DeliveryTag {
        DeliveryTag::new(self.next_tag.fetch_add(1, Ordering::Relaxed))
    }
}

/// Consumer side.
pub struct InMemoryDeliveryQueue {
    rx: mpsc::UnboundedReceiver<Delivery>,
    requeued: VecDeque<Delivery>,
    /// 0 = unlimited.
    prefetch: usize,
    shared: Arc<Shared>,
}

/// Producer/inspection side.
pub struct InMemoryQueueHandle {
    tx: Option<mpsc::UnboundedSender<Delivery>>,
    shared: Arc<Shared>,
}

impl InMemoryDeliveryQueue {
    /// Unlimited prefetch.
    pub fn new() -> (Self, InMemoryQueueHandle) {
        Self::with_prefetch(0)
    }

    /// At most `prefetch` unsettled deliveries at a time; 0 means no limit.
    pub fn with_prefetch(prefetch: u16) -> (Self, InMemoryQueueHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            ledger: Mutex::new(Ledger::default()),
            next_tag: AtomicU64::new(1),
            fail_acks: AtomicBool::new(false),
        });
        let queue = Self {
            rx,
            requeued: VecDeque::new(),
            prefetch: usize::from(prefetch),
            shared: Arc::clone(&shared),
        };
        let handle = InMemoryQueueHandle {
            tx: Some(tx),
            shared,
        };
        (queue, handle)
    }

    /// Simulate channel teardown: every unsettled delivery goes back to the
    /// head of the queue, in tag order, as a redelivery.
    pub async fn requeue_unsettled(&mut self) {
        let in_flight = std::mem::take(&mut self.shared.ledger.lock().await.in_flight);
        for (_, body) in in_flight {
            self.push_redelivery(body);
        }
    }

    fn push_redelivery(&mut self, body: Vec<u8>) {
        let redelivery = Delivery::new(self.shared.allocate_tag(), body).redelivered(true);
        self.requeued.push_back(redelivery);
    }

    async fn settle(&self, tag: DeliveryTag) -> Result<Vec<u8>, String> {
        self.shared
            .ledger
            .lock()
            .await
            .in_flight
            .remove(&tag)
            .ok_or_else(|| "unknown or already settled delivery tag".to_string())
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn recv(&mut self) -> Result<Option<Delivery>, ConsumerError> {
        let unsettled = self.shared.ledger.lock().await.in_flight.len();
        if self.prefetch > 0 && unsettled >= self.prefetch {
            // Only this consumer can settle, and it is waiting here: nothing
            // is delivered until the subscription is torn down.
            return std::future::pending().await;
        }

        let delivery = match self.requeued.pop_front() {
            Some(delivery) => Some(delivery),
            None => self.rx.recv().await,
        };
        if let Some(delivery) = &delivery {
            self.shared
                .ledger
                .lock()
                .await
                .in_flight
                .insert(delivery.tag, delivery.body.clone());
        }
        Ok(delivery)
    }

    async fn ack(&mut self, tag: DeliveryTag) -> Result<(), ConsumerError> {
        if self.shared.fail_acks.load(Ordering::Relaxed) {
            return Err(ConsumerError::Ack {
                tag,
                reason: "channel closed".to_string(),
            });
        }
        self.settle(tag)
            .await
            .map_err(|reason| ConsumerError::Ack { tag, reason })?;
        self.shared.ledger.lock().await.acked.push(tag);
        Ok(())
    }

    async fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ConsumerError> {
        let body = self
            .settle(tag)
            .await
            .map_err(|reason| ConsumerError::Reject { tag, reason })?;
        self.shared.ledger.lock().await.rejected.push((tag, requeue));
        if requeue {
            self.push_redelivery(body);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.requeue_unsettled().await;
    }
}

impl InMemoryQueueHandle {
    /// Enqueue a raw body; returns the tag it will be delivered with.
    pub fn publish(&self, body: impl Into<Vec<u8>>) -> DeliveryTag {
        let tag = self.shared.allocate_tag();
        if let Some(tx) = &self.tx {
            // receiver gone: the consumer has stopped, nothing to deliver to
            let _ = tx.send(Delivery::new(tag, body.into()));
        }
        tag
    }

    /// End the subscription once already-published messages are drained.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Make every following ack fail, as if the channel had dropped.
    pub fn fail_acks(&self, fail: bool) {
        self.shared.fail_acks.store(fail, Ordering::Relaxed);
    }

    pub async fn acked(&self) -> Vec<DeliveryTag> {
        self.shared.ledger.lock().await.acked.clone()
    }

    pub async fn rejected(&self) -> Vec<(DeliveryTag, bool)> {
        self.shared.ledger.lock().await.rejected.clone()
    }

    /// Delivered but neither acked nor rejected.
    pub async fn unsettled(&self) -> Vec<DeliveryTag> {
        self.shared
            .ledger
            .lock()
            .await
            .in_flight
            .keys()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_recv_ack() {
        let (mut queue, handle) = InMemoryDeliveryQueue::new();
        let tag = handle.publish("hello");

        let delivery = queue.recv().await.unwrap().unwrap();
        assert_eq!(delivery.tag, tag);
        assert_eq!(delivery.body, b"hello");
        assert!(!delivery.redelivered);
        assert_eq!(handle.unsettled().await, vec![tag]);

        queue.ack(tag).await.unwrap();
        assert_eq!(handle.acked().await, vec![tag]);
        assert!(handle.unsettled().await.is_empty());
    }

    #[tokio::test]
    async fn double_ack_is_an_error() {
        let (mut queue, handle) = InMemoryDeliveryQueue::new();
        let tag = handle.publish("x");
        queue.recv().await.unwrap();

        queue.ack(tag).await.unwrap();
        let err = queue.ack(tag).await.unwrap_err();
        assert!(matches!(err, ConsumerError::Ack { tag: t, .. } if t == tag));
    }

    #[tokio::test]
    async fn closed_handle_ends_subscription() {
        let (mut queue, mut handle) = InMemoryDeliveryQueue::new();
        handle.publish("last");
        handle.close();

        assert!(queue.recv().await.unwrap().is_some());
        assert!(queue.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reject_with_requeue_redelivers_under_new_tag() {
        let (mut queue, handle) = InMemoryDeliveryQueue::new();
        let first = handle.publish("again");
        queue.recv().await.unwrap();

        queue.reject(first, true).await.unwrap();
        let redelivery = queue.recv().await.unwrap().unwrap();
        assert_ne!(redelivery.tag, first);
        assert!(redelivery.redelivered);
        assert_eq!(redelivery.body, b"again");
        assert_eq!(handle.rejected().await, vec![(first, true)]);
    }

    #[tokio::test]
    async fn prefetch_limit_holds_back_deliveries_while_unsettled() {
        let (mut queue, handle) = InMemoryDeliveryQueue::with_prefetch(1);
        let first = handle.publish("withheld");
        handle.publish("waiting");
        queue.recv().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.recv()).await;
        assert!(blocked.is_err(), "second delivery must wait for a free slot");

        queue.ack(first).await.unwrap();
        let next = queue.recv().await.unwrap().unwrap();
        assert_eq!(next.body, b"waiting");
    }

    #[tokio::test]
    async fn unlimited_prefetch_keeps_delivering() {
        let (mut queue, handle) = InMemoryDeliveryQueue::new();
        handle.publish("a");
        handle.publish("b");

        queue.recv().await.unwrap();
        queue.recv().await.unwrap();
        assert_eq!(handle.unsettled().await.len(), 2);
    }

    #[tokio::test]
    async fn teardown_requeues_unsettled_deliveries() {
        let (mut queue, handle) = InMemoryDeliveryQueue::new();
        let tag = handle.publish("stuck");
        queue.recv().await.unwrap();

        queue.requeue_unsettled().await;
        let redelivery = queue.recv().await.unwrap().unwrap();
        assert!(redelivery.redelivered);
        assert_ne!(redelivery.tag, tag);
        assert_eq!(handle.unsettled().await, vec![redelivery.tag]);
    }
}
