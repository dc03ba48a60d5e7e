//! Ordered fallback chain over model candidates.
//!
//! [`CandidateChain`] holds an ordered list of [`ModelCandidate`]s and tracks
//! how each has fared during the current invocation. The invoker consults it
//! to decide whether to retry the same candidate or move on. State is kept
//! per position, so a name listed twice gets two separate budgets.
//!
//! # Retry policy
//!
//! - **Transient failures** (overload, rate limit, 5xx): retry the same
//!   candidate until its `max_attempts` budget is spent, then advance.
//! - **Terminal failures** (bad request, malformed or empty output): advance
//!   immediately without retrying.
//!
//! # Example
//!
//! ```rust
//! use campus_voice::llm::{CandidateChain, FailureKind, ModelCandidate};
//!
//! let mut chain = CandidateChain::new(vec![
//!     ModelCandidate::new("primary", 2),
//!     ModelCandidate::new("secondary", 1),
//! ]);
//!
//! assert_eq!(chain.next_candidate().map(|c| c.name), Some("primary".to_string()));
//! assert!(chain.report_failure(FailureKind::Transient));
//! assert!(!chain.report_failure(FailureKind::Transient));
//!
//! assert_eq!(chain.next_candidate().map(|c| c.name), Some("secondary".to_string()));
//! assert!(!chain.report_failure(FailureKind::Terminal));
//! assert!(chain.next_candidate().is_none());
//! ```

use tracing::{debug, info, warn};

use super::classify::FailureKind;
use crate::config::CandidateConfig;

/// One backend identifier with its attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidate {
    /// Backend model identifier.
    pub name: String,
    /// Maximum attempts against this candidate (at least one is always made).
    pub max_attempts: u32,
}

impl ModelCandidate {
    /// Create a candidate.
    pub fn new(name: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            name: name.into(),
            max_attempts,
        }
    }

    /// Candidates from the `[model]` config section, in order.
    pub fn from_config(entries: &[CandidateConfig]) -> Vec<Self> {
        entries
            .iter()
            .map(|c| Self::new(c.name.clone(), c.max_attempts))
            .collect()
    }
}

/// Per-candidate failure tracking.
#[derive(Debug, Default)]
struct CandidateState {
    attempts: u32,
    abandoned: bool,
}

/// Ordered fallback chain for one invocation.
///
/// Failures and successes are reported against the candidate most recently
/// returned by [`next_candidate`](Self::next_candidate).
#[derive(Debug)]
pub struct CandidateChain {
    candidates: Vec<ModelCandidate>,
    state: Vec<CandidateState>,
    current_index: usize,
}

impl CandidateChain {
    /// Create a new chain. The first candidate is tried first.
    pub fn new(candidates: Vec<ModelCandidate>) -> Self {
        Self {
            state: candidates.iter().map(|_| CandidateState::default()).collect(),
            candidates,
            current_index: 0,
        }
    }

    /// Return the candidate to try next, advancing past exhausted ones.
    ///
    /// Returns `None` when the chain is fully exhausted.
    pub fn next_candidate(&mut self) -> Option<ModelCandidate> {
        while let (Some(candidate), Some(state)) = (
            self.candidates.get(self.current_index),
            self.state.get(self.current_index),
        ) {
            if state.abandoned || state.attempts >= candidate.max_attempts.max(1) {
                info!(
                    candidate = candidate.name.as_str(),
                    attempts = state.attempts,
                    "fallback chain: skipping exhausted candidate"
                );
                self.current_index += 1;
                continue;
            }

            return Some(candidate.clone());
        }
        None
    }

    /// Number of attempts already made against the current candidate.
    pub fn attempts_made(&self) -> u32 {
        self.state.get(self.current_index).map_or(0, |s| s.attempts)
    }

    /// Record a failed attempt against the current candidate. Returns `true`
    /// when it will be retried.
    pub fn report_failure(&mut self, kind: FailureKind) -> bool {
        let (Some(candidate), Some(state)) = (
            self.candidates.get(self.current_index),
            self.state.get_mut(self.current_index),
        ) else {
            return false;
        };
        let name = candidate.name.as_str();
        let max_attempts = candidate.max_attempts.max(1);
        state.attempts += 1;

        match kind {
            FailureKind::Transient if state.attempts < max_attempts => {
                debug!(
                    candidate = name,
                    attempts = state.attempts,
                    max = max_attempts,
                    "transient failure, will retry"
                );
                true
            }
            FailureKind::Transient => {
                warn!(
                    candidate = name,
                    attempts = state.attempts,
                    "retries exhausted, moving to next candidate"
                );
                state.abandoned = true;
                false
            }
            FailureKind::Terminal => {
                warn!(candidate = name, "terminal failure, abandoning candidate");
                state.abandoned = true;
                false
            }
        }
    }

    /// Record a success against the current candidate.
    pub fn report_success(&mut self) {
        if let Some(state) = self.state.get_mut(self.current_index) {
            state.attempts += 1;
        }
        if let Some(candidate) = self.candidates.get(self.current_index) {
            info!(candidate = candidate.name.as_str(), "model candidate succeeded");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn names(chain: &mut CandidateChain) -> Option<String> {
        chain.next_candidate().map(|c| c.name)
    }

    #[test]
    fn empty_chain_returns_none() {
        let mut chain = CandidateChain::new(vec![]);
        assert_eq!(names(&mut chain), None);
        assert!(!chain.report_failure(FailureKind::Transient));
    }

    #[test]
    fn transient_failures_exhaust_after_budget() {
        let mut chain = CandidateChain::new(vec![
            ModelCandidate::new("cloud", 3),
            ModelCandidate::new("backup", 1),
        ]);

        for i in 1..=3 {
            assert_eq!(names(&mut chain), Some("cloud".into()));
            let retry = chain.report_failure(FailureKind::Transient);
            assert_eq!(retry, i < 3);
        }
        assert_eq!(chain.attempts_made(), 3);
        assert_eq!(names(&mut chain), Some("backup".into()));
        assert_eq!(chain.attempts_made(), 0);
    }

    #[test]
    fn terminal_failure_skips_immediately() {
        let mut chain = CandidateChain::new(vec![
            ModelCandidate::new("cloud", 3),
            ModelCandidate::new("backup", 1),
        ]);
        assert_eq!(names(&mut chain), Some("cloud".into()));
        assert!(!chain.report_failure(FailureKind::Terminal));
        assert_eq!(chain.attempts_made(), 1);
        assert_eq!(names(&mut chain), Some("backup".into()));
    }

    #[test]
    fn zero_budget_still_gets_one_attempt() {
        let mut chain = CandidateChain::new(vec![ModelCandidate::new("only", 0)]);
        assert_eq!(names(&mut chain), Some("only".into()));
        assert!(!chain.report_failure(FailureKind::Transient));
        assert_eq!(names(&mut chain), None);
    }

    #[test]
    fn candidates_tried_in_order() {
        let mut chain = CandidateChain::new(vec![
            ModelCandidate::new("first", 1),
            ModelCandidate::new("second", 1),
            ModelCandidate::new("third", 1),
        ]);
        assert_eq!(names(&mut chain), Some("first".into()));
        chain.report_failure(FailureKind::Terminal);
        assert_eq!(names(&mut chain), Some("second".into()));
        chain.report_failure(FailureKind::Terminal);
        assert_eq!(names(&mut chain), Some("third".into()));
        chain.report_success();
        assert_eq!(chain.attempts_made(), 1);
    }

    #[test]
    fn repeated_name_gets_its_own_budget() {
        let mut chain = CandidateChain::new(vec![
            ModelCandidate::new("flash", 2),
            ModelCandidate::new("pro", 1),
            ModelCandidate::new("flash", 1),
        ]);

        assert_eq!(names(&mut chain), Some("flash".into()));
        assert!(chain.report_failure(FailureKind::Transient));
        assert_eq!(names(&mut chain), Some("flash".into()));
        assert!(!chain.report_failure(FailureKind::Transient));

        assert_eq!(names(&mut chain), Some("pro".into()));
        assert!(!chain.report_failure(FailureKind::Terminal));

        assert_eq!(names(&mut chain), Some("flash".into()));
        assert_eq!(chain.attempts_made(), 0);
        assert!(!chain.report_failure(FailureKind::Transient));
        assert_eq!(names(&mut chain), None);
    }

    #[test]
    fn from_config_preserves_order_and_budgets() {
        let candidates = ModelCandidate::from_config(&[
            CandidateConfig::new("a", 3),
            CandidateConfig::new("b", 1),
        ]);
        assert_eq!(
            candidates,
            vec![ModelCandidate::new("a", 3), ModelCandidate::new("b", 1)]
        );
    }
}
