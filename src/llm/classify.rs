//! Transient / terminal classification of backend failures.
//!
//! Retry decisions never inspect error strings directly; they go through a
//! [`FailureClassifier`]. The default [`OverloadPolicy`] matches a configurable
//! set of HTTP statuses and message fragments.

use super::error::ModelError;
use crate::config::ModelConfig;

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Overload, rate limit, or server-side outage. Retried with backoff.
    Transient,
    /// Anything else. The candidate is abandoned.
    Terminal,
}

/// Decides whether a backend failure is worth retrying.
pub trait FailureClassifier: Send + Sync {
    /// Classify one failure.
    fn classify(&self, error: &ModelError) -> FailureKind;
}

impl<F> FailureClassifier for F
where
    F: Fn(&ModelError) -> FailureKind + Send + Sync,
{
    fn classify(&self, error: &ModelError) -> FailureKind {
        self(error)
    }
}

/// Status and message-pattern based classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverloadPolicy {
    statuses: Vec<u16>,
    patterns: Vec<String>,
}

impl OverloadPolicy {
    /// Create a policy from explicit statuses and (case-insensitive) message fragments.
    pub fn new(statuses: Vec<u16>, patterns: Vec<String>) -> Self {
        Self {
            statuses,
            patterns: patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Build the policy from the `[model]` config section.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.overload_statuses.clone(),
            config.overload_patterns.clone(),
        )
    }
}

impl Default for OverloadPolicy {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

impl FailureClassifier for OverloadPolicy {
    fn classify(&self, error: &ModelError) -> FailureKind {
        if let ModelError::EmptyResponse(_) | ModelError::Config(_) = error {
            return FailureKind::Terminal;
        }
        if let Some(status) = error.status()
            && self.statuses.contains(&status)
        {
            return FailureKind::Transient;
        }
        let message = error.message().to_lowercase();
        if self.patterns.iter().any(|p| message.contains(p.as_str())) {
            FailureKind::Transient
        } else {
            FailureKind::Terminal
        }
    }
}
