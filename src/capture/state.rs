//! Capture session state with compare-and-transition updates.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CaptureError;

/// Voice states for one assistant panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Idle,
    Arming,
    Listening,
    Finalizing,
    Processing,
    Speaking,
    Error,
}

impl CaptureState {
    /// Whether `self -> next` is a legal edge.
    ///
    /// Any non-idle state may drop to idle (cancellation).
    #[must_use]
    pub fn can_transition_to(self, next: CaptureState) -> bool {
        use CaptureState::*;
        matches!(
            (self, next),
            (Idle, Arming)
                | (Arming, Listening)
                | (Listening, Finalizing)
                | (Finalizing, Processing)
                | (Processing, Speaking)
                | (Arming | Listening, Error)
                | (Error, Idle)
        ) || (self != Idle && next == Idle)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Arming => "arming",
            Self::Listening => "listening",
            Self::Finalizing => "finalizing",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSnapshot {
    pub state: CaptureState,
    /// Latest interim fragment, if one is pending.
    pub partial_transcript: Option<String>,
    /// Final fragments accumulated so far, space-joined.
    pub final_transcript: String,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: CaptureState,
    partial: Option<String>,
    finals: Vec<String>,
    started_at: Option<DateTime<Utc>>,
}

/// The single authoritative state for one panel.
///
/// Every engine callback goes through [`transition`](Self::transition), so
/// concurrent arrivals serialize on one lock and a stale transition (e.g. a
/// second finalize) is rejected instead of applied.
#[derive(Debug)]
pub struct CaptureSession {
    inner: Mutex<Inner>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CaptureState::Idle,
                partial: None,
                finals: Vec::new(),
                started_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // State is plain data; a panic mid-update cannot leave it half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    #[must_use]
    pub fn snapshot(&self) -> CaptureSnapshot {
        let inner = self.lock();
        CaptureSnapshot {
            state: inner.state,
            partial_transcript: inner.partial.clone(),
            final_transcript: inner.finals.join(" "),
            started_at: inner.started_at,
        }
    }

    /// Move `from -> to` if the session is currently in `from`.
    ///
    /// # Errors
    ///
    /// [`CaptureError::InvalidTransition`] if the session is elsewhere or the
    /// edge is illegal.
    pub fn transition(&self, from: CaptureState, to: CaptureState) -> Result<(), CaptureError> {
        let mut inner = self.lock();
        if inner.state != from || !from.can_transition_to(to) {
            return Err(CaptureError::InvalidTransition {
                from: inner.state,
                to,
            });
        }
        inner.state = to;
        if to == CaptureState::Arming {
            inner.partial = None;
            inner.finals.clear();
            inner.started_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Force the session to idle from wherever it is. Returns the prior state.
    pub fn reset(&self) -> CaptureState {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CaptureState::Idle;
        inner.partial = None;
        previous
    }

    /// Record an interim fragment. Ignored outside `listening`.
    pub fn record_interim(&self, text: &str) -> bool {
        let mut inner = self.lock();
        if inner.state != CaptureState::Listening {
            return false;
        }
        inner.partial = Some(text.to_owned());
        true
    }

    /// Record a final fragment and clear any pending interim.
    /// Ignored outside `listening`.
    pub fn record_final(&self, text: &str) -> bool {
        let mut inner = self.lock();
        if inner.state != CaptureState::Listening {
            return false;
        }
        inner.partial = None;
        let text = text.trim();
        if !text.is_empty() {
            inner.finals.push(text.to_owned());
        }
        true
    }

    /// Whether an interim fragment is waiting for its final.
    #[must_use]
    pub fn has_pending_interim(&self) -> bool {
        self.lock().partial.is_some()
    }

    /// Idempotent `listening -> finalizing`.
    ///
    /// Returns the accumulated transcript to whichever caller wins; every
    /// later caller gets `None`.
    pub fn finalize(&self) -> Option<String> {
        let mut inner = self.lock();
        if inner.state != CaptureState::Listening {
            return None;
        }
        inner.state = CaptureState::Finalizing;
        inner.partial = None;
        Some(inner.finals.join(" "))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;

    fn listening() -> CaptureSession {
        let session = CaptureSession::new();
        session.transition(CaptureState::Idle, CaptureState::Arming).unwrap();
        session.transition(CaptureState::Arming, CaptureState::Listening).unwrap();
        session
    }

    #[test]
    fn legal_and_illegal_edges() {
        use CaptureState::*;
        assert!(Idle.can_transition_to(Arming));
        assert!(Processing.can_transition_to(Idle));
        assert!(Listening.can_transition_to(Error));
        assert!(!Idle.can_transition_to(Listening));
        assert!(Arming.can_transition_to(Error));
        assert!(!Finalizing.can_transition_to(Error));
        assert!(!Processing.can_transition_to(Error));
        assert!(Finalizing.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Idle));
    }

    #[test]
    fn transition_requires_expected_state() {
        let session = CaptureSession::new();
        let err = session
            .transition(CaptureState::Listening, CaptureState::Finalizing)
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidTransition {
                from: CaptureState::Idle,
                ..
            }
        ));
        assert_eq!(session.state(), CaptureState::Idle);
    }

    #[test]
    fn fragments_accumulate_only_while_listening() {
        let session = CaptureSession::new();
        assert!(!session.record_final("ignored"));

        let session = listening();
        session.record_interim("download p");
        assert!(session.has_pending_interim());
        session.record_final("download pyq");
        assert!(!session.has_pending_interim());
        session.record_final("for AI");
        assert_eq!(session.snapshot().final_transcript, "download pyq for AI");
    }

    #[test]
    fn finalize_is_idempotent() {
        let session = listening();
        session.record_final("srb");
        assert_eq!(session.finalize().as_deref(), Some("srb"));
        assert_eq!(session.finalize(), None);
        assert_eq!(session.state(), CaptureState::Finalizing);
    }

    #[test]
    fn concurrent_finalize_has_one_winner() {
        let session = Arc::new(listening());
        session.record_final("check attendance");
        let winners: usize = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || session.finalize().is_some())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn arming_clears_previous_transcript() {
        let session = listening();
        session.record_final("old words");
        session.reset();
        session.transition(CaptureState::Idle, CaptureState::Arming).unwrap();
        assert_eq!(session.snapshot().final_transcript, "");
        assert!(session.snapshot().started_at.is_some());
    }
}
