//! Ports - seams to the broker and the data store.

pub mod connection;
pub mod delivery_queue;

pub use self::connection::ConnectionProvider;
pub use self::delivery_queue::{Delivery, DeliveryQueue, DeliveryTag};
