//! Speech capture state machine.
//!
//! `idle -> arming -> listening -> finalizing -> processing -> speaking -> idle`,
//! with `error` reachable from arming/listening/finalizing and cancellation
//! dropping any non-idle state straight to idle.
//!
//! - [`state`]: the authoritative session state and its transitions
//! - [`engine`]: recognizer and synthesizer traits
//! - [`controller`]: the event loop that drives one turn

pub mod controller;
pub mod engine;
pub mod state;

pub use controller::{CaptureController, CommandHandler, TurnOutcome};
pub use engine::{
    RecognizerEvent, RecognizerFailure, SilentSynthesizer, SpeechRecognizer, SpeechSynthesizer,
    SynthesizerEvent,
};
pub use state::{CaptureSession, CaptureSnapshot, CaptureState};

/// Capture-engine and state-machine failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no speech detected")]
    NoSpeech,

    #[error("capture aborted by the engine")]
    Aborted,

    #[error("speech engine error: {0}")]
    Engine(String),

    #[error("invalid capture transition {from} -> {to}")]
    InvalidTransition {
        from: CaptureState,
        to: CaptureState,
    },

    #[error("a capture turn is already active")]
    Busy,
}

impl CaptureError {
    /// Short sentence suitable for showing or speaking to the user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "I need microphone access to hear you. Please allow it and try again."
            }
            Self::NoSpeech => "I didn't catch that. Please try again.",
            Self::Aborted => "Listening stopped.",
            Self::Busy => "I'm already listening.",
            Self::Engine(_) | Self::InvalidTransition { .. } => {
                "Voice input isn't working right now. You can type your command instead."
            }
        }
    }
}

impl From<RecognizerFailure> for CaptureError {
    fn from(failure: RecognizerFailure) -> Self {
        match failure {
            RecognizerFailure::PermissionDenied => Self::PermissionDenied,
            RecognizerFailure::NoSpeech => Self::NoSpeech,
            RecognizerFailure::Aborted => Self::Aborted,
            RecognizerFailure::Engine(message) => Self::Engine(message),
        }
    }
}
