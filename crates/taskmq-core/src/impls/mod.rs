//! Port implementations.
//!
//! - **AmqpDeliveryQueue**: RabbitMQ subscription (`lapin`)
//! - **MySqlConnectionProvider**: pooled MySQL connections (`sqlx`)
//! - **InMemoryDeliveryQueue**: channel-fed queue for tests and dry runs

pub mod amqp;
pub mod memory;
pub mod mysql;

pub use self::amqp::AmqpDeliveryQueue;
pub use self::memory::{InMemoryDeliveryQueue, InMemoryQueueHandle};
pub use self::mysql::MySqlConnectionProvider;
