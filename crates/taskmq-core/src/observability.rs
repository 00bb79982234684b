use serde::{Deserialize, Serialize};

/// Per-consumer delivery counters, logged when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCounts {
    pub received: usize,
    pub acked: usize,
    /// Handler returned non-success; ack withheld, message left in flight.
    pub withheld: usize,
    pub dead_lettered: usize,
}
