//! Drives one capture turn end-to-end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::{RecognizerEvent, SpeechRecognizer, SpeechSynthesizer, SynthesizerEvent};
use super::state::{CaptureSession, CaptureState};
use super::CaptureError;
use crate::config::CaptureConfig;
use crate::runtime::RuntimeEvent;

/// Engine event queue depth.
const EVENT_CAPACITY: usize = 64;

/// Runtime event broadcast depth.
const RUNTIME_EVENT_CAPACITY: usize = 128;

/// Turns a final transcript into an optional spoken reply.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle_transcript(
        &self,
        session_id: &str,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Option<String>;
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed {
        transcript: String,
        spoken: Option<String>,
    },
    Cancelled,
}

/// Event loop for one assistant panel.
pub struct CaptureController {
    session_id: String,
    session: Arc<CaptureSession>,
    recognizer: Arc<dyn SpeechRecognizer>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    handler: Arc<dyn CommandHandler>,
    silence_timeout: Duration,
    events: broadcast::Sender<RuntimeEvent>,
    active: Mutex<Option<CancellationToken>>,
}

impl CaptureController {
    pub fn new(
        session_id: impl Into<String>,
        recognizer: Arc<dyn SpeechRecognizer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        handler: Arc<dyn CommandHandler>,
        config: &CaptureConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(RUNTIME_EVENT_CAPACITY);
        Self {
            session_id: session_id.into(),
            session: Arc::new(CaptureSession::new()),
            recognizer,
            synthesizer,
            handler,
            silence_timeout: Duration::from_millis(config.silence_timeout_ms),
            events,
            active: Mutex::new(None),
        }
    }

    /// Publish runtime events on an existing channel.
    #[must_use]
    pub fn with_events(mut self, events: broadcast::Sender<RuntimeEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &Arc<CaptureSession> {
        &self.session
    }

    pub fn state(&self) -> CaptureState {
        self.session.state()
    }

    /// Cancel the active turn, tearing down audio and playback.
    ///
    /// The session is idle when this returns. A no-op when already idle.
    pub async fn cancel(&self) {
        let token = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(token) = token {
            token.cancel();
        }
        self.teardown().await;
    }

    /// Run one full turn: arm, listen, finalize, process, speak, idle.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Busy`] if a turn is already active; engine failures
    /// (permission denied, no speech, aborted) after the session has been
    /// returned to idle.
    pub async fn run_turn(&self) -> Result<TurnOutcome, CaptureError> {
        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if active.is_some() || self.session.state() != CaptureState::Idle {
                return Err(CaptureError::Busy);
            }
            *active = Some(cancel.clone());
        }

        let result = self.drive(&cancel).await;
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = None;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(_) if cancel.is_cancelled() => {
                self.teardown().await;
                Ok(TurnOutcome::Cancelled)
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "capture turn failed");
                self.recognizer.stop().await;
                let state = self.session.state();
                if state.can_transition_to(CaptureState::Error) {
                    let _ = self.move_to(state, CaptureState::Error);
                    let _ = self.move_to(CaptureState::Error, CaptureState::Idle);
                } else {
                    self.force_idle();
                }
                self.emit(RuntimeEvent::CaptureFailed {
                    session_id: self.session_id.clone(),
                    message: e.user_message().to_owned(),
                });
                Err(e)
            }
        }
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<TurnOutcome, CaptureError> {
        self.move_to(CaptureState::Idle, CaptureState::Arming)?;

        let (tx, mut rx) = mpsc::channel(EVENT_CAPACITY);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(self.abort().await),
            started = self.recognizer.start(tx) => started?,
        }

        let silence = tokio::time::sleep(self.silence_timeout);
        tokio::pin!(silence);
        let mut silence_armed = false;

        let transcript = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(self.abort().await),
                () = &mut silence, if silence_armed => {
                    silence_armed = false;
                    debug!(session_id = %self.session_id, "trailing silence elapsed");
                    if let Some(text) = self.finalize() {
                        break text;
                    }
                }
                event = rx.recv() => match event {
                    Some(RecognizerEvent::Started) => {
                        if self.session.state() == CaptureState::Arming {
                            self.move_to(CaptureState::Arming, CaptureState::Listening)?;
                        }
                    }
                    Some(RecognizerEvent::Interim(text)) => {
                        if self.session.record_interim(&text) {
                            silence_armed = false;
                            self.emit_transcript(text, false);
                        }
                    }
                    Some(RecognizerEvent::Final(text)) => {
                        if self.session.record_final(&text) {
                            silence.as_mut().reset(Instant::now() + self.silence_timeout);
                            silence_armed = true;
                            self.emit_transcript(text, true);
                        }
                    }
                    Some(RecognizerEvent::Ended) | None => {
                        if let Some(text) = self.finalize() {
                            break text;
                        }
                        return Err(if self.session.state() == CaptureState::Arming {
                            CaptureError::NoSpeech
                        } else {
                            CaptureError::Aborted
                        });
                    }
                    Some(RecognizerEvent::Failed(failure)) => return Err(failure.into()),
                },
            }
        };
        self.recognizer.stop().await;

        if transcript.trim().is_empty() {
            return Err(CaptureError::NoSpeech);
        }
        info!(session_id = %self.session_id, transcript = %transcript, "utterance finalized");

        self.move_to(CaptureState::Finalizing, CaptureState::Processing)?;
        let spoken = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(self.abort().await),
            spoken = self.handler.handle_transcript(&self.session_id, &transcript, cancel) => spoken,
        };
        let spoken = spoken.filter(|s| !s.trim().is_empty());

        match &spoken {
            Some(text) => {
                self.move_to(CaptureState::Processing, CaptureState::Speaking)?;
                self.emit(RuntimeEvent::SpokenResponse {
                    session_id: self.session_id.clone(),
                    text: text.clone(),
                });
                if !self.speak(text, cancel).await {
                    return Ok(self.abort().await);
                }
                self.move_to(CaptureState::Speaking, CaptureState::Idle)?;
            }
            None => self.move_to(CaptureState::Processing, CaptureState::Idle)?,
        }

        Ok(TurnOutcome::Completed { transcript, spoken })
    }

    /// Play `text`; returns `false` if cancelled first. Playback errors only log.
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> bool {
        let (tx, mut rx) = mpsc::channel(EVENT_CAPACITY);
        let started = tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            started = self.synthesizer.speak(text, tx) => started,
        };
        if let Err(e) = started {
            warn!(session_id = %self.session_id, error = %e, "speech playback failed to start");
            return true;
        }
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return false,
                event = rx.recv() => match event {
                    Some(SynthesizerEvent::Started) => {}
                    Some(SynthesizerEvent::Ended) | None => return true,
                    Some(SynthesizerEvent::Failed(message)) => {
                        warn!(session_id = %self.session_id, error = %message, "speech playback failed");
                        return true;
                    }
                },
            }
        }
    }

    fn finalize(&self) -> Option<String> {
        let text = self.session.finalize()?;
        self.emit_state(CaptureState::Listening, CaptureState::Finalizing);
        Some(text)
    }

    async fn abort(&self) -> TurnOutcome {
        info!(session_id = %self.session_id, "capture turn cancelled");
        self.teardown().await;
        TurnOutcome::Cancelled
    }

    async fn teardown(&self) {
        self.recognizer.stop().await;
        self.synthesizer.cancel().await;
        self.force_idle();
    }

    fn force_idle(&self) {
        let previous = self.session.reset();
        if previous != CaptureState::Idle {
            self.emit_state(previous, CaptureState::Idle);
        }
    }

    fn move_to(&self, from: CaptureState, to: CaptureState) -> Result<(), CaptureError> {
        self.session.transition(from, to)?;
        self.emit_state(from, to);
        Ok(())
    }

    fn emit_state(&self, from: CaptureState, to: CaptureState) {
        debug!(session_id = %self.session_id, %from, %to, "capture state");
        self.emit(RuntimeEvent::CaptureStateChanged {
            session_id: self.session_id.clone(),
            from,
            to,
        });
    }

    fn emit_transcript(&self, text: String, is_final: bool) {
        self.emit(RuntimeEvent::Transcript {
            session_id: self.session_id.clone(),
            text,
            is_final,
        });
    }

    fn emit(&self, event: RuntimeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
