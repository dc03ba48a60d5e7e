//! Runtime events emitted by the pipeline for UI and observability.
//!
//! Events are small and cloneable so they can go out on a broadcast channel
//! without slowing the capture loop. A lagging subscriber loses events; the
//! pipeline never waits for it.

use serde::Serialize;

use crate::capture::CaptureState;
use crate::intent::Action;

/// What the assistant is doing "right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// The capture state machine moved.
    CaptureStateChanged {
        session_id: String,
        from: CaptureState,
        to: CaptureState,
    },
    /// Recognizer text, interim or final.
    Transcript {
        session_id: String,
        text: String,
        is_final: bool,
    },
    /// A command resolved to an intent.
    IntentResolved {
        session_id: String,
        intent_label: String,
        action: Action,
    },
    /// The assistant is about to speak (or display) a response.
    SpokenResponse { session_id: String, text: String },
    /// A capture-engine failure, already phrased for the user.
    CaptureFailed { session_id: String, message: String },
    /// The assistant panel closed and its history was dropped.
    SessionClosed { session_id: String },
}

impl RuntimeEvent {
    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CaptureStateChanged { .. } => "capture.state",
            Self::Transcript { .. } => "capture.transcript",
            Self::IntentResolved { .. } => "intent.resolved",
            Self::SpokenResponse { .. } => "response.spoken",
            Self::CaptureFailed { .. } => "capture.failed",
            Self::SessionClosed { .. } => "session.closed",
        }
    }
}
