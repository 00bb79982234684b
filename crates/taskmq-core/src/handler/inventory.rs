//! Inventory statistics batch handler.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{NoopRecordProcessor, RecordProcessor, TaskHandler};
use crate::domain::{HandlerStatus, Payload};

/// What a batch run did, beyond its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub status: HandlerStatus,
    /// Records the loop went over.
    pub visited: usize,
    /// Records handed to the processor (including the one that failed).
    pub attempted: usize,
    pub failed_at: Option<usize>,
}

impl BatchSummary {
    fn seed() -> Self {
        Self {
            status: HandlerStatus::Unprocessed,
            visited: 0,
            attempted: 0,
            failed_at: None,
        }
    }
}

/// Folds a list of inventory records into one status.
///
/// Fold rules:
/// - seed is `Unprocessed`;
/// - while the aggregate is `Unprocessed` or `Success`, each record is
///   processed; success sets `Success`, an error (or panic) sets `Failed`;
/// - after the first failure the remaining records are still iterated but not
///   processed (drain without work), so `visited` always equals the batch size;
/// - an empty batch leaves the seed in place and returns `Unprocessed`.
pub struct InventoryStatisticsHandler<P = NoopRecordProcessor> {
    processor: P,
}

impl InventoryStatisticsHandler<NoopRecordProcessor> {
    pub fn new() -> Self {
        Self {
            processor: NoopRecordProcessor,
        }
    }
}

impl Default for InventoryStatisticsHandler<NoopRecordProcessor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> InventoryStatisticsHandler<P> {
    pub fn with_processor(processor: P) -> Self {
        Self { processor }
    }

    pub async fn run_batch<C>(&self, conn: &mut C, records: &[Value]) -> BatchSummary
    where
        C: Send + 'static,
        P: RecordProcessor<C>,
    {
        let mut summary = BatchSummary::seed();

        for (index, record) in records.iter().enumerate() {
            summary.visited += 1;

            if !matches!(
                summary.status,
                HandlerStatus::Unprocessed | HandlerStatus::Success
            ) {
                continue;
            }

            summary.attempted += 1;
            let outcome = AssertUnwindSafe(self.processor.process(conn, index, record))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => summary.status = HandlerStatus::Success,
                Ok(Err(e)) => {
                    error!(index, error = %e, "inventory record failed");
                    summary.status = HandlerStatus::Failed;
                    summary.failed_at = Some(index);
                }
                Err(_) => {
                    error!(index, "inventory record processor panicked");
                    summary.status = HandlerStatus::Failed;
                    summary.failed_at = Some(index);
                }
            }
        }

        debug!(
            visited = summary.visited,
            attempted = summary.attempted,
            status = %summary.status,
            "inventory batch folded"
        );
        summary
    }
}

#[async_trait]
impl<C, P> TaskHandler<C> for InventoryStatisticsHandler<P>
where
    C: Send + 'static,
    P: RecordProcessor<C>,
{
    async fn execute(&self, conn: &mut C, payload: &Payload) -> HandlerStatus {
        let Some(records) = payload.records() else {
            warn!("inventory payload is not a record list");
            return HandlerStatus::Failed;
        };

        let summary = self.run_batch(conn, records).await;
        if summary.status == HandlerStatus::Unprocessed {
            // Empty batch: the seed escapes as the final status.
            warn!("inventory batch was empty; status left unprocessed");
        }
        summary.status
    }
}
