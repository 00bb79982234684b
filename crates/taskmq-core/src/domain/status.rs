//! Handler result codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state result of one handler execution.
///
/// The integer values are the process exit code in one-shot mode.
///
/// `Unprocessed` is the fold seed of the batch handler. It escapes as a final
/// value only when the batch is empty; it is passed through as-is and treated
/// like any other non-success (no ack).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerStatus {
    Success = 0,
    Failed = 1,
    Unprocessed = 2,
}

impl HandlerStatus {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Acknowledge iff the delivery was fully processed.
    pub fn should_ack(self) -> bool {
        self.is_success()
    }
}

impl fmt::Display for HandlerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Unprocessed => "unprocessed",
        };
        write!(f, "{name}({})", self.code())
    }
}
