//! Layered configuration: YAML file, then `TASKMQ_*` environment overrides.
//!
//! ```yaml
//! broker:
//!   user: app
//!   password: secret
//!   host: mq.internal
//!   vhost: /inventory
//! database:
//!   host: db.internal
//!   user: app
//!   password: secret
//!   schema: juice
//! consumer:
//!   malformed: dead_letter
//! ```
//!
//! Environment keys use `__` between sections, e.g.
//! `TASKMQ_BROKER__HOST=localhost`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::consumer::{MalformedPolicy, ReconnectPolicy};
use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "TASKMQ";

/// Directory holding `config.yaml` when `--config` is not given.
pub const HOME_ENV: &str = "TASKMQ_HOME";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    /// Cap on unacked deliveries per channel; 0 means no cap.
    ///
    /// Non-success deliveries are never acked, so each one holds a slot until
    /// the channel closes. A non-zero value stalls the consumer after that
    /// many failures.
    #[serde(default)]
    pub prefetch: u16,
    /// Declare the queue with a `<queue>_dlx` / `<queue>_dlq` dead-letter pair.
    /// Leave off when the queue already exists with other arguments.
    #[serde(default)]
    pub declare_topology: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_database_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsumerConfig {
    /// Overrides the task's default queue.
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub malformed: MalformedPolicy,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_broker_port() -> u16 {
    5672
}

fn default_database_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    1
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// `$TASKMQ_HOME/config.yaml`, or `./config.yaml`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os(HOME_ENV)
        .map(PathBuf::from)
        .unwrap_or_default()
        .join("config.yaml")
}

impl AppConfig {
    /// Load from `path` (required) or the default location (optional), then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path.to_path_buf()).required(true),
            None => File::from(default_config_path()).required(false),
        };
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true);

        let config = Config::builder().add_source(file).add_source(env).build()?;
        Self::finish(config)
    }

    /// File only, no environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(true))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.host is empty".to_string()));
        }
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::Invalid("database.host is empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        let reconnect = &self.consumer.reconnect;
        if reconnect.initial_backoff_ms > reconnect.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "consumer.reconnect.initial_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}
