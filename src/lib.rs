//! Campus portal voice assistant: natural-language commands to portal actions.
//!
//! A command flows through a fixed set of components:
//! Speech capture → Intent resolver → Action dispatcher → spoken response
//!
//! # Architecture
//!
//! - **Capture**: explicit state machine over recognizer/synthesizer engines
//! - **Intent**: deterministic fast-path matchers, then a schema-checked model
//!   call, then a keyword scan
//! - **Dispatch**: maps intents to portal effects; domain questions go back
//!   to the model, grounded on the knowledge cache
//! - **LLM**: retrying invoker over an ordered candidate list
//! - **Knowledge**: TTL cache over slow document extraction, single-flight
//!   per source
//! - **Conversation**: bounded per-session history

pub mod capture;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod intent;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
pub mod runtime;

#[cfg(test)]
mod test_utils;

pub use capture::{CaptureController, CaptureState};
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use intent::{Action, ResolvedIntent};
pub use pipeline::AssistantPipeline;
pub use runtime::RuntimeEvent;
