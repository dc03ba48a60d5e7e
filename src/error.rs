//! Error types for the command pipeline.

use crate::capture::CaptureError;
use crate::intent::ResolveError;
use crate::knowledge::KnowledgeError;
use crate::llm::InvocationError;

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Language-model invocation failed on every candidate.
    #[error("model error: {0}")]
    Model(#[from] InvocationError),

    /// Knowledge document could not be materialized.
    #[error("knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    /// Command could not be turned into an intent.
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Speech capture or playback engine failure.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
