//! Task kinds: external names, default queues and payload shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::envelope::PayloadShape;
use crate::error::UnsupportedTaskError;

/// Closed set of tasks this consumer knows how to run.
///
/// Adding a task means adding a variant here; every `match` on `TaskKind`
/// (handler resolution, default queue, payload shape) then has to be extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Inventory product-list batches.
    #[serde(rename = "inventoryStaticticsMain")]
    InventoryStatistics,
}

impl TaskKind {
    pub const ALL: &'static [TaskKind] = &[TaskKind::InventoryStatistics];

    /// External task name as passed on the command line.
    ///
    /// The misspelling is part of the deployed contract; keep it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InventoryStatistics => "inventoryStaticticsMain",
        }
    }

    /// Queue the task consumes from unless overridden.
    pub fn default_queue(self) -> &'static str {
        match self {
            Self::InventoryStatistics => "data.ofc.inventory.product_list",
        }
    }

    pub fn payload_shape(self) -> PayloadShape {
        match self {
            Self::InventoryStatistics => PayloadShape::Records,
        }
    }
}

impl FromStr for TaskKind {
    type Err = UnsupportedTaskError;

    /// Exact, case-sensitive match. No aliases, no fallback.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| UnsupportedTaskError(name.to_string()))
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
