//! Host-facing command contract and the stdio bridge.

pub mod contract;
pub mod stdio;

pub use contract::{CommandRequest, CommandResponse, EventEnvelope};
