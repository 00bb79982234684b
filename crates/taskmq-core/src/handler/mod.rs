//! Handler contract - the unit of business logic bound to a task.
//!
//! A handler receives the decoded payload and a checked-out data-store
//! connection and answers with a [`HandlerStatus`]. Errors inside a handler do
//! not cross this boundary; only the status does, and the consumer turns it
//! into an ack decision.

pub mod inventory;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{HandlerStatus, Payload};
use crate::error::RecordProcessingError;

pub use self::inventory::{BatchSummary, InventoryStatisticsHandler};

/// Executes one task against one payload.
///
/// `C` is the connection type of the [`ConnectionProvider`](crate::ports::ConnectionProvider)
/// the consumer was built with.
#[async_trait]
pub trait TaskHandler<C>: Send + Sync {
    async fn execute(&self, conn: &mut C, payload: &Payload) -> HandlerStatus;
}

/// Per-record business computation used by batch handlers.
#[async_trait]
pub trait RecordProcessor<C>: Send + Sync {
    async fn process(
        &self,
        conn: &mut C,
        index: usize,
        record: &Value,
    ) -> Result<(), RecordProcessingError>;
}

/// Accepts every record without touching the connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecordProcessor;

#[async_trait]
impl<C: Send + 'static> RecordProcessor<C> for NoopRecordProcessor {
    async fn process(
        &self,
        _conn: &mut C,
        _index: usize,
        _record: &Value,
    ) -> Result<(), RecordProcessingError> {
        Ok(())
    }
}
