//! MySQL connections via a lazily opened `sqlx` pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::ConnectionError;
use crate::ports::ConnectionProvider;

/// No connection is opened until the first delivery needs one; after that
/// connections are reused through the pool.
#[derive(Debug, Clone)]
pub struct MySqlConnectionProvider {
    pool: MySqlPool,
}

impl MySqlConnectionProvider {
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.schema);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy_with(options);

        info!(
            host = %config.host,
            port = config.port,
            schema = %config.schema,
            max_connections = config.max_connections,
            "database pool configured"
        );
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ConnectionProvider for MySqlConnectionProvider {
    type Connection = PoolConnection<MySql>;

    async fn acquire(&self) -> Result<Self::Connection, ConnectionError> {
        let conn = self.pool.acquire().await?;
        debug!(pool_size = self.pool.size(), idle = self.pool.num_idle(), "connection acquired");
        Ok(conn)
    }
}
