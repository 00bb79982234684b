use thiserror::Error;

use crate::ports::DeliveryTag;

/// Errors that stop (or would stop) the consume loop.
///
/// Record-level failures never show up here: they are folded into
/// [`HandlerStatus::Failed`](crate::domain::HandlerStatus) inside the handler.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("ack failed for delivery_tag={tag}: {reason}")]
    Ack { tag: DeliveryTag, reason: String },

    #[error("reject failed for delivery_tag={tag}: {reason}")]
    Reject { tag: DeliveryTag, reason: String },

    #[error("broker error: {0}")]
    Broker(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl ConsumerError {
    /// Ack/reject failures usually mean the channel went away; a reconnect
    /// (or process restart) lets the broker redeliver.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Ack { .. } | Self::Reject { .. } | Self::Broker(_))
    }
}

/// Requested task name is not in the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not supported task: {0}")]
pub struct UnsupportedTaskError(pub String);

/// Data-store connection could not be checked out.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("database connection failed: {0}")]
    Acquire(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Failure while processing one record of a batch.
#[derive(Debug, Error)]
#[error("record {index}: {message}")]
pub struct RecordProcessingError {
    pub index: usize,
    pub message: String,
}

impl RecordProcessingError {
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}
