//! Consumer - receive, dispatch, ack.
//!
//! One delivery is processed to completion before the next `recv`. The ack
//! decision is taken right after the handler returns:
//!
//! | handler status     | broker action                         |
//! |--------------------|---------------------------------------|
//! | `Success` (0)      | `ack(tag)`                            |
//! | `Failed` (1)       | none, stays unacked until teardown    |
//! | `Unprocessed` (2)  | none, stays unacked until teardown    |
//!
//! A body that is not a valid envelope, or whose `data` has the wrong shape
//! for the task, is handled by [`MalformedPolicy`]. Transient broker failures
//! (ack, reject, subscription) are retried by
//! [`run_with_reconnect`](Consumer::run_with_reconnect).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::domain::{Envelope, HandlerStatus, TaskKind};
use crate::error::ConsumerError;
use crate::handler::TaskHandler;
use crate::observability::DeliveryCounts;
use crate::ports::{ConnectionProvider, Delivery, DeliveryQueue};
use crate::registry::TaskRegistry;

/// What to do with a delivery whose body cannot be decoded, or whose `data`
/// does not have the shape the task expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Reject without requeue; the broker routes it to the dead-letter
    /// exchange if the queue has one, otherwise drops it.
    #[default]
    DeadLetter,
    /// Stop the consumer with [`ConsumerError::MalformedEnvelope`].
    Fatal,
}

/// Backoff between broker reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Consecutive failed attempts before giving up; 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the 1-based `attempt`: doubles from the initial value,
    /// capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let ms = self.initial_backoff_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }

    fn gives_up_after(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

/// How one delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    /// Handler did not succeed; no ack was sent.
    Withheld(HandlerStatus),
    DeadLettered,
}

impl DeliveryOutcome {
    /// Process exit code for one-shot runs: the handler status, or 1 for a
    /// dead-lettered body.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Acked => HandlerStatus::Success.code(),
            Self::Withheld(status) => status.code(),
            Self::DeadLettered => 1,
        }
    }
}

pub struct Consumer<Q, P: ConnectionProvider> {
    queue: Q,
    provider: P,
    task: TaskKind,
    handler: Arc<dyn TaskHandler<P::Connection>>,
    malformed: MalformedPolicy,
    counts: DeliveryCounts,
}

impl<Q, P> Consumer<Q, P>
where
    Q: DeliveryQueue,
    P: ConnectionProvider,
    P::Connection: 'static,
{
    pub fn new(
        queue: Q,
        provider: P,
        registry: &TaskRegistry<P::Connection>,
        task: TaskKind,
    ) -> Self {
        Self {
            queue,
            provider,
            task,
            handler: registry.resolve(task),
            malformed: MalformedPolicy::default(),
            counts: DeliveryCounts::default(),
        }
    }

    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    pub fn counts(&self) -> &DeliveryCounts {
        &self.counts
    }

    pub fn into_parts(self) -> (Q, P) {
        (self.queue, self.provider)
    }

    /// Consume until the subscription ends, shutdown is signalled (or its
    /// sender dropped), or a fatal error occurs.
    ///
    /// Shutdown is only observed between deliveries: a delivery already being
    /// handled runs to completion.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        info!(task = %self.task, "consumer started");
        let result = self.receive_loop(&mut shutdown).await;

        let counts = &self.counts;
        match &result {
            Ok(()) => info!(
                task = %self.task,
                received = counts.received,
                acked = counts.acked,
                withheld = counts.withheld,
                dead_lettered = counts.dead_lettered,
                "consumer stopped"
            ),
            Err(e) => error!(
                task = %self.task,
                error = %e,
                transient = e.is_transient(),
                received = counts.received,
                acked = counts.acked,
                withheld = counts.withheld,
                dead_lettered = counts.dead_lettered,
                "consumer failed"
            ),
        }
        result
    }

    async fn receive_loop(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ConsumerError> {
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested");
                return Ok(());
            }

            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("shutdown sender dropped");
                        return Ok(());
                    }
                    continue;
                }
                delivery = self.queue.recv() => delivery?,
            };

            let Some(delivery) = delivery else {
                info!("subscription closed");
                return Ok(());
            };
            self.handle(delivery).await?;
        }
    }

    /// Like [`run`](Self::run), but a transient failure closes the current
    /// subscription (its unsettled deliveries go back to the queue) and
    /// `connect` is retried with backoff. Counters carry over.
    ///
    /// Returns `Ok` on shutdown, even one requested while waiting to
    /// reconnect.
    pub async fn run_with_reconnect<F, Fut>(
        &mut self,
        shutdown: watch::Receiver<bool>,
        policy: &ReconnectPolicy,
        mut connect: F,
    ) -> Result<(), ConsumerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Q, ConsumerError>>,
    {
        loop {
            match self.run(shutdown.clone()).await {
                Err(e) if e.is_transient() => {
                    self.queue.close().await;
                    match self.reconnect(shutdown.clone(), policy, &mut connect).await? {
                        Some(queue) => self.queue = queue,
                        None => return Ok(()),
                    }
                }
                result => return result,
            }
        }
    }

    async fn reconnect<F, Fut>(
        &self,
        mut shutdown: watch::Receiver<bool>,
        policy: &ReconnectPolicy,
        connect: &mut F,
    ) -> Result<Option<Q>, ConsumerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Q, ConsumerError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let delay = policy.backoff(attempt);
            warn!(
                task = %self.task,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnecting to broker"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("shutdown requested while reconnecting");
                    return Ok(None);
                }
            }

            match connect().await {
                Ok(queue) => {
                    info!(task = %self.task, attempt, "reconnected");
                    return Ok(Some(queue));
                }
                Err(e) if e.is_transient() && !policy.gives_up_after(attempt) => {
                    warn!(task = %self.task, attempt, error = %e, "reconnect failed");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Receive and settle exactly one delivery. `None` if the subscription
    /// ended first.
    pub async fn run_once(&mut self) -> Result<Option<DeliveryOutcome>, ConsumerError> {
        match self.queue.recv().await? {
            Some(delivery) => self.handle(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<DeliveryOutcome, ConsumerError> {
        let tag = delivery.tag;
        self.counts.received += 1;
        info!(
            task = %self.task,
            delivery_tag = %tag,
            redelivered = delivery.redelivered,
            bytes = delivery.body.len(),
            "received"
        );

        let shape = self.task.payload_shape();
        let decoded = Envelope::decode(&delivery.body).and_then(|envelope| {
            envelope.payload().check_shape(shape)?;
            Ok(envelope)
        });
        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(e) => return self.on_malformed(&delivery, e).await,
        };

        let mut conn = self.provider.acquire().await?;
        let status = self.handler.execute(&mut conn, envelope.payload()).await;
        self.provider.release(conn).await;

        let elapsed_ms = (Utc::now() - delivery.received_at).num_milliseconds();
        if !status.should_ack() {
            self.counts.withheld += 1;
            warn!(
                task = %self.task,
                delivery_tag = %tag,
                %status,
                elapsed_ms,
                "handler did not succeed; ack withheld"
            );
            return Ok(DeliveryOutcome::Withheld(status));
        }

        if let Err(e) = self.queue.ack(tag).await {
            error!(task = %self.task, delivery_tag = %tag, error = %e, "ack failed");
            return Err(e);
        }
        self.counts.acked += 1;
        info!(task = %self.task, delivery_tag = %tag, %status, elapsed_ms, "acked");
        Ok(DeliveryOutcome::Acked)
    }

    async fn on_malformed(
        &mut self,
        delivery: &Delivery,
        cause: ConsumerError,
    ) -> Result<DeliveryOutcome, ConsumerError> {
        error!(
            task = %self.task,
            delivery_tag = %delivery.tag,
            error = %cause,
            policy = ?self.malformed,
            "malformed envelope"
        );
        match self.malformed {
            MalformedPolicy::Fatal => Err(cause),
            MalformedPolicy::DeadLetter => {
                self.queue.reject(delivery.tag, false).await?;
                self.counts.dead_lettered += 1;
                Ok(DeliveryOutcome::DeadLettered)
            }
        }
    }
}
