//! External speech engines, treated as opaque event sources.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::CaptureError;

/// Why the recognizer stopped with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerFailure {
    PermissionDenied,
    NoSpeech,
    Aborted,
    Engine(String),
}

/// Events pushed by a speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Audio capture is live.
    Started,
    /// Provisional text; may be revised.
    Interim(String),
    /// Settled text for one segment.
    Final(String),
    /// The engine ended the session on its own.
    Ended,
    Failed(RecognizerFailure),
}

/// Events pushed by a speech synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesizerEvent {
    Started,
    Ended,
    Failed(String),
}

/// Speech-to-text engine.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begin capture; events flow into `events` until [`stop`](Self::stop).
    async fn start(&self, events: mpsc::Sender<RecognizerEvent>) -> Result<(), CaptureError>;

    /// Tear down the audio stream. Must be safe to call when not started.
    async fn stop(&self);
}

/// Text-to-speech engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Begin speaking `text`; events flow into `events`.
    async fn speak(&self, text: &str, events: mpsc::Sender<SynthesizerEvent>) -> Result<(), CaptureError>;

    /// Stop playback immediately. Must be safe to call when idle.
    async fn cancel(&self);
}

/// Synthesizer that reports instant completion. For text-only hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    async fn speak(&self, _text: &str, events: mpsc::Sender<SynthesizerEvent>) -> Result<(), CaptureError> {
        let _ = events.send(SynthesizerEvent::Started).await;
        let _ = events.send(SynthesizerEvent::Ended).await;
        Ok(())
    }

    async fn cancel(&self) {}
}
