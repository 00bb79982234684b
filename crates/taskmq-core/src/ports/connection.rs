//! ConnectionProvider port - scoped data-store connections.

use async_trait::async_trait;

use crate::error::ConnectionError;

/// Hands out a data-store connection per delivery.
///
/// Implementations are expected to pool: the consumer checks a connection out
/// before the handler runs and gives it back right after, on every path.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Connection: Send;

    async fn acquire(&self) -> Result<Self::Connection, ConnectionError>;

    /// Return the connection. Pooled connections go back to the pool on drop.
    async fn release(&self, conn: Self::Connection) {
        drop(conn);
    }
}
