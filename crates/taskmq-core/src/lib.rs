//! taskmq-core
//!
//! Queue-driven task consumer: receive a message, dispatch it to the handler
//! registered for the task, ack only when the handler succeeds.
//!
//! # Modules
//! - **domain**: envelope, parameters, handler status, task kinds
//! - **ports**: DeliveryQueue, ConnectionProvider
//! - **handler**: TaskHandler contract and the inventory batch handler
//! - **registry**: TaskKind -> handler dispatch table
//! - **consumer**: the receive / dispatch / ack loop
//! - **impls**: AMQP, MySQL and in-memory adapters
//! - **config**: layered YAML + environment configuration

pub mod config;
pub mod consumer;
pub mod domain;
pub mod error;
pub mod handler;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod registry;

pub use config::AppConfig;
pub use consumer::{Consumer, DeliveryOutcome, MalformedPolicy, ReconnectPolicy};
pub use domain::{
    Envelope, HandlerStatus, Parameters, Payload, PayloadShape, TaskKind, parse_params,
};
pub use error::{ConfigError, ConnectionError, ConsumerError, UnsupportedTaskError};
pub use handler::TaskHandler;
pub use observability::DeliveryCounts;
pub use registry::TaskRegistry;
