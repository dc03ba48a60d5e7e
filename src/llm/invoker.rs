//! Resilient invocation across an ordered list of model candidates.
//!
//! [`ModelInvoker::invoke`] is the single implementation of "try model A, on
//! overload back off and retry, then fall through to model B". Each call site
//! passes its own candidate list (and therefore its own per-candidate retry
//! budgets).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::backend::{ModelBackend, Prompt};
use super::classify::{FailureClassifier, FailureKind, OverloadPolicy};
use super::error::{AggregatedFailure, InvocationError, ModelError};
use super::fallback::{CandidateChain, ModelCandidate};
use super::http::HttpModelBackend;
use super::retry::RetryPolicy;
use crate::config::ModelConfig;

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The candidate returned usable text.
    Success,
    /// Overload-style failure; may have been retried.
    TransientFailure,
    /// Non-retryable failure; candidate abandoned.
    TerminalFailure,
}

/// Record of one call to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationAttempt {
    /// Candidate name.
    pub candidate: String,
    /// 1-based attempt number against this candidate.
    pub attempt_number: u32,
    /// What happened.
    pub outcome: AttemptOutcome,
    /// Wall time of the call (excluding backoff).
    pub latency: Duration,
}

/// Successful invocation.
#[derive(Debug, Clone)]
pub struct InvocationOutput {
    /// Response text (never empty).
    pub text: String,
    /// Candidate that produced it.
    pub candidate: String,
    /// Every attempt made, in order, ending with the success.
    pub attempts: Vec<InvocationAttempt>,
}

/// Stateless invoker shared by every call site.
#[derive(Clone)]
pub struct ModelInvoker {
    backend: Arc<dyn ModelBackend>,
    classifier: Arc<dyn FailureClassifier>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("backend", &self.backend.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ModelInvoker {
    /// Create an invoker with the default [`OverloadPolicy`].
    pub fn new(backend: Arc<dyn ModelBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            classifier: Arc::new(OverloadPolicy::default()),
            retry,
        }
    }

    /// Replace the failure classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Build an HTTP-backed invoker from the `[model]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the HTTP backend cannot be created.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let backend = HttpModelBackend::from_config(config)?;
        Ok(Self::new(Arc::new(backend), RetryPolicy::from_config(config))
            .with_classifier(Arc::new(OverloadPolicy::from_config(config))))
    }

    /// Invoke candidates in order until one returns non-empty text.
    ///
    /// Cancellation is honoured both during a call and during backoff sleeps.
    ///
    /// # Errors
    ///
    /// - [`InvocationError::NoCandidates`] for an empty candidate list.
    /// - [`InvocationError::Cancelled`] if `cancel` fires first.
    /// - [`InvocationError::Exhausted`] with the last error when every candidate failed.
    pub async fn invoke(
        &self,
        prompt: &Prompt,
        candidates: &[ModelCandidate],
        cancel: &CancellationToken,
    ) -> Result<InvocationOutput, InvocationError> {
        if candidates.is_empty() {
            return Err(InvocationError::NoCandidates);
        }

        let mut chain = CandidateChain::new(candidates.to_vec());
        let mut attempts: Vec<InvocationAttempt> = Vec::new();
        let mut last_error: Option<ModelError> = None;

        while let Some(candidate) = chain.next_candidate() {
            let attempt_number = chain.attempts_made() + 1;
            let request = prompt.to_request(&candidate.name);
            let started = Instant::now();

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(candidate = %candidate.name, "invocation cancelled during call");
                    return Err(InvocationError::Cancelled);
                }
                result = self.backend.generate(&request) => result,
            };
            let latency = started.elapsed();

            let error = match result {
                Ok(text) if !text.trim().is_empty() => {
                    chain.report_success();
                    attempts.push(InvocationAttempt {
                        candidate: candidate.name.clone(),
                        attempt_number,
                        outcome: AttemptOutcome::Success,
                        latency,
                    });
                    return Ok(InvocationOutput {
                        text,
                        candidate: candidate.name,
                        attempts,
                    });
                }
                Ok(_) => ModelError::EmptyResponse(format!("{} returned no text", candidate.name)),
                Err(e) => e,
            };

            let kind = match error {
                ModelError::EmptyResponse(_) => FailureKind::Terminal,
                ref other => self.classifier.classify(other),
            };
            warn!(
                candidate = %candidate.name,
                attempt = attempt_number,
                kind = ?kind,
                error = %error,
                "model attempt failed"
            );
            attempts.push(InvocationAttempt {
                candidate: candidate.name.clone(),
                attempt_number,
                outcome: match kind {
                    FailureKind::Transient => AttemptOutcome::TransientFailure,
                    FailureKind::Terminal => AttemptOutcome::TerminalFailure,
                },
                latency,
            });
            last_error = Some(error);

            if chain.report_failure(kind) {
                let delay = self.retry.delay_for_attempt(attempt_number);
                info!(
                    candidate = %candidate.name,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        info!(candidate = %candidate.name, "invocation cancelled during backoff");
                        return Err(InvocationError::Cancelled);
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        let (Some(last_error), Some(last_attempt)) = (last_error, attempts.last().cloned()) else {
            return Err(InvocationError::NoCandidates);
        };
        let transient = attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::TransientFailure)
            .count();
        let overloaded = transient * 2 > attempts.len();

        warn!(
            attempts = attempts.len(),
            overloaded,
            last_candidate = %last_attempt.candidate,
            "all model candidates exhausted"
        );
        Err(InvocationError::Exhausted(Box::new(AggregatedFailure {
            last_error,
            last_attempt,
            attempts,
            overloaded,
        })))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::llm::backend::ModelRequest;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Backend that replays a scripted result per model and counts calls.
    #[derive(Default)]
    struct ScriptedBackend {
        scripts: Mutex<HashMap<String, Vec<Result<String, ModelError>>>>,
        fallback: HashMap<String, Result<String, ModelError>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn always(entries: &[(&str, Result<String, ModelError>)]) -> Self {
            Self {
                fallback: entries
                    .iter()
                    .map(|(k, v)| ((*k).to_owned(), v.clone()))
                    .collect(),
                ..Self::default()
            }
        }

        fn calls_for(&self, model: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.as_str() == model)
                .count()
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
            self.calls.lock().unwrap().push(request.model.clone());
            if let Some(queue) = self.scripts.lock().unwrap().get_mut(&request.model)
                && !queue.is_empty()
            {
                return queue.remove(0);
            }
            self.fallback
                .get(&request.model)
                .cloned()
                .unwrap_or_else(|| Err(ModelError::Config("unscripted".into())))
        }
    }

    fn overloaded() -> Result<String, ModelError> {
        Err(ModelError::Http {
            status: 503,
            message: "The model is overloaded.".into(),
        })
    }

    fn bad_request(msg: &str) -> Result<String, ModelError> {
        Err(ModelError::Http {
            status: 400,
            message: msg.into(),
        })
    }

    fn invoker(backend: Arc<ScriptedBackend>) -> ModelInvoker {
        ModelInvoker::new(backend, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_primary_falls_through_to_secondary() {
        let backend = Arc::new(ScriptedBackend::always(&[
            ("primary", overloaded()),
            ("secondary", Ok("from secondary".into())),
        ]));
        let candidates = vec![
            ModelCandidate::new("primary", 3),
            ModelCandidate::new("secondary", 2),
        ];

        let out = invoker(Arc::clone(&backend))
            .invoke(&Prompt::text("hi"), &candidates, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.text, "from secondary");
        assert_eq!(out.candidate, "secondary");
        assert_eq!(backend.calls_for("primary"), 3);
        assert_eq!(backend.calls_for("secondary"), 1);
        assert_eq!(out.attempts.len(), 4);
        assert_eq!(out.attempts[3].outcome, AttemptOutcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_grow_exponentially() {
        let backend = Arc::new(ScriptedBackend::always(&[("primary", overloaded())]));
        let started = tokio::time::Instant::now();
        let result = invoker(backend)
            .invoke(
                &Prompt::text("hi"),
                &[ModelCandidate::new("primary", 3)],
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
        // 2s after attempt 1, 4s after attempt 2, no sleep after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(7), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn terminal_failures_are_not_retried() {
        let backend = Arc::new(ScriptedBackend::always(&[
            ("a", bad_request("bad a")),
            ("b", bad_request("bad b")),
        ]));
        let candidates = vec![ModelCandidate::new("a", 3), ModelCandidate::new("b", 3)];

        let err = invoker(Arc::clone(&backend))
            .invoke(&Prompt::text("hi"), &candidates, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(backend.calls_for("a"), 1);
        assert_eq!(backend.calls_for("b"), 1);
        let InvocationError::Exhausted(failure) = err else {
            panic!("expected exhaustion");
        };
        assert_eq!(failure.last_attempt.candidate, "b");
        assert_eq!(failure.last_error.message(), "bad b");
        assert!(!failure.overloaded);
    }

    #[tokio::test]
    async fn empty_text_is_terminal() {
        let backend = Arc::new(ScriptedBackend::always(&[
            ("a", Ok("   ".into())),
            ("b", Ok("real".into())),
        ]));
        let candidates = vec![ModelCandidate::new("a", 3), ModelCandidate::new("b", 1)];
        let out = invoker(Arc::clone(&backend))
            .invoke(&Prompt::text("hi"), &candidates, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.text, "real");
        assert_eq!(backend.calls_for("a"), 1);
        assert_eq!(out.attempts[0].outcome, AttemptOutcome::TerminalFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_overload_is_flagged() {
        let backend = Arc::new(ScriptedBackend::always(&[
            ("a", overloaded()),
            ("b", overloaded()),
        ]));
        let candidates = vec![ModelCandidate::new("a", 2), ModelCandidate::new("b", 1)];
        let err = invoker(backend)
            .invoke(&Prompt::text("hi"), &candidates, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_overloaded());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_then_success_on_same_candidate() {
        let backend = ScriptedBackend::default();
        backend.scripts.lock().unwrap().insert(
            "a".into(),
            vec![overloaded(), Ok("second time lucky".into())],
        );
        let backend = Arc::new(backend);
        let out = invoker(Arc::clone(&backend))
            .invoke(
                &Prompt::text("hi"),
                &[ModelCandidate::new("a", 3)],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.text, "second time lucky");
        assert_eq!(out.attempts.len(), 2);
        assert_eq!(out.attempts[1].attempt_number, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_aborts() {
        let backend = Arc::new(ScriptedBackend::always(&[
            ("a", overloaded()),
            ("b", Ok("never reached".into())),
        ]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let candidates = vec![ModelCandidate::new("a", 3), ModelCandidate::new("b", 1)];
        let err = invoker(Arc::clone(&backend))
            .invoke(&Prompt::text("hi"), &candidates, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Cancelled));
        assert_eq!(backend.calls_for("a"), 1);
        assert_eq!(backend.calls_for("b"), 0);
    }

    #[tokio::test]
    async fn empty_candidate_list_is_rejected() {
        let backend = Arc::new(ScriptedBackend::default());
        let err = invoker(backend)
            .invoke(&Prompt::text("hi"), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::NoCandidates));
    }

    #[tokio::test]
    async fn custom_classifier_controls_retries() {
        let backend = Arc::new(ScriptedBackend::always(&[("a", bad_request("quota"))]));
        let classifier = |e: &ModelError| {
            if e.message().contains("quota") {
                FailureKind::Transient
            } else {
                FailureKind::Terminal
            }
        };
        let invoker = ModelInvoker::new(
            Arc::clone(&backend) as Arc<dyn ModelBackend>,
            RetryPolicy::default().with_base_delay_ms(1),
        )
        .with_classifier(Arc::new(classifier));
        let _ = invoker
            .invoke(
                &Prompt::text("hi"),
                &[ModelCandidate::new("a", 2)],
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(backend.calls_for("a"), 2);
    }
}
