//! Domain model: parameters, envelopes, task kinds and handler status.

pub mod envelope;
pub mod params;
pub mod status;
pub mod task;

pub use envelope::{Envelope, Payload, PayloadShape};
pub use params::{Parameters, parse_params};
pub use status::HandlerStatus;
pub use task::TaskKind;
