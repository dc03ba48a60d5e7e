//! Per-session conversation history.
//!
//! Each session owns a bounded log of turns. Eviction happens on append, so
//! a reader never sees more than the configured window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Spoken or typed by the student.
    User,
    /// Produced by the assistant.
    Assistant,
}

/// One recorded exchange line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker.
    pub role: Role,
    /// Turn text.
    pub content: String,
    /// When the turn was recorded.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// A user turn stamped now.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn stamped now.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded, ordered turn log (oldest first).
#[derive(Debug, Clone)]
pub struct ConversationLog {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl ConversationLog {
    /// Create an empty log holding at most `max_turns` turns.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Seed a log from caller-supplied history, keeping the newest turns.
    #[must_use]
    pub fn from_turns(max_turns: usize, turns: impl IntoIterator<Item = ConversationTurn>) -> Self {
        let mut log = Self::new(max_turns);
        for turn in turns {
            log.append(turn);
        }
        log
    }

    /// Append a turn, evicting from the head past the bound.
    pub fn append(&mut self, turn: ConversationTurn) {
        if self.max_turns == 0 {
            return;
        }
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// The most recent `n` turns in original order.
    #[must_use]
    pub fn window(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// The most recent `n` turns satisfying `predicate`, in original order.
    ///
    /// Filtering happens before windowing: irrelevant turns interleaved with
    /// relevant ones do not push relevant turns out of the window.
    #[must_use]
    pub fn window_filtered_by_topic<P>(&self, n: usize, predicate: P) -> Vec<ConversationTurn>
    where
        P: Fn(&ConversationTurn) -> bool,
    {
        let mut relevant: Vec<ConversationTurn> = self
            .turns
            .iter()
            .rev()
            .filter(|t| predicate(t))
            .take(n)
            .cloned()
            .collect();
        relevant.reverse();
        relevant
    }

    /// Number of turns stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Configured bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.max_turns
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Case-insensitive topic predicate over turn content.
pub fn mentions_any<'a>(keywords: &'a [&'a str]) -> impl Fn(&ConversationTurn) -> bool + 'a {
    move |turn| {
        let lower = turn.content.to_lowercase();
        keywords.iter().any(|k| lower.contains(k))
    }
}

/// Conversation logs keyed by session id.
///
/// Logs are created on first use and dropped on [`close`](Self::close).
#[derive(Debug, Clone)]
pub struct ConversationRegistry {
    sessions: Arc<Mutex<HashMap<String, ConversationLog>>>,
    window: usize,
}

impl ConversationRegistry {
    /// Create a registry whose logs hold `window` turns.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Every mutation is a single map or deque operation, so a poisoned
    /// map is still consistent.
    fn sessions(&self) -> MutexGuard<'_, HashMap<String, ConversationLog>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a turn to the session's log, creating it if needed.
    pub fn append(&self, session_id: &str, turn: ConversationTurn) {
        self.sessions()
            .entry(session_id.to_owned())
            .or_insert_with(|| ConversationLog::new(self.window))
            .append(turn);
    }

    /// Replace the session's log with caller-supplied history.
    pub fn seed(&self, session_id: &str, turns: Vec<ConversationTurn>) {
        self.sessions().insert(
            session_id.to_owned(),
            ConversationLog::from_turns(self.window, turns),
        );
    }

    /// Snapshot of the session's log (empty if unknown).
    #[must_use]
    pub fn snapshot(&self, session_id: &str) -> ConversationLog {
        self.sessions()
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| ConversationLog::new(self.window))
    }

    /// Drop a session's log. Returns whether the session existed.
    pub fn close(&self, session_id: &str) -> bool {
        self.sessions().remove(session_id).is_some()
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }
}
