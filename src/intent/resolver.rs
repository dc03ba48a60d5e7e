//! The intent resolver.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::matchers::{match_command, vocabulary_scan};
use super::parse::parse_model_intent;
use super::prompt::build_intent_prompt;
use super::resources::{NoResourceDirectory, ResourceDirectory, ResourceQuery};
use super::{Action, Command, ResolveError, ResolvedIntent, normalize, params};
use crate::conversation::ConversationLog;
use crate::llm::{InvocationError, ModelCandidate, ModelInvoker, Prompt};

/// Turns used as model context.
const DEFAULT_HISTORY_TURNS: usize = 5;

/// Upper bound on the best-effort resource lookup.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Budget for the whole model tier, all attempts included.
const DEFAULT_MODEL_DEADLINE: Duration = Duration::from_secs(20);

/// Resolves commands: deterministic matchers first, model second, keyword
/// scan last. Never fails for a non-blank command.
#[derive(Clone)]
pub struct IntentResolver {
    invoker: Option<ModelInvoker>,
    candidates: Vec<ModelCandidate>,
    directory: Arc<dyn ResourceDirectory>,
    history_turns: usize,
    model_deadline: Duration,
}

impl std::fmt::Debug for IntentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentResolver")
            .field("model_enabled", &self.invoker.is_some())
            .field("candidates", &self.candidates)
            .field("history_turns", &self.history_turns)
            .field("model_deadline", &self.model_deadline)
            .finish_non_exhaustive()
    }
}

impl IntentResolver {
    /// Resolver that only uses deterministic matching.
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            invoker: None,
            candidates: Vec::new(),
            directory: Arc::new(NoResourceDirectory),
            history_turns: DEFAULT_HISTORY_TURNS,
            model_deadline: DEFAULT_MODEL_DEADLINE,
        }
    }

    /// Resolver that falls back to the model for unmatched commands.
    #[must_use]
    pub fn with_model(invoker: ModelInvoker, candidates: Vec<ModelCandidate>) -> Self {
        Self {
            invoker: Some(invoker),
            candidates,
            ..Self::deterministic()
        }
    }

    /// Use `directory` for the best-effort resource id lookup.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn ResourceDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Number of recent turns shown to the model.
    #[must_use]
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Give up on the model after `deadline` and use the keyword scan.
    #[must_use]
    pub fn with_model_deadline(mut self, deadline: Duration) -> Self {
        self.model_deadline = deadline;
        self
    }

    /// Resolve `command` against the session's conversation.
    ///
    /// # Errors
    ///
    /// [`ResolveError::EmptyCommand`] for blank input (checked before any
    /// matcher or model call) and [`ResolveError::Cancelled`] if `cancel`
    /// fires during the model call. Every other outcome is an intent, at
    /// worst [`ResolvedIntent::unknown`].
    pub async fn resolve(
        &self,
        command: &Command,
        context: &ConversationLog,
        cancel: &CancellationToken,
    ) -> Result<ResolvedIntent, ResolveError> {
        if command.text.trim().is_empty() {
            return Err(ResolveError::EmptyCommand);
        }

        let normalized = normalize(&command.text);
        let session_id = command.session_id.as_str();

        let intent = if let Some((matcher, intent)) = match_command(&normalized) {
            debug!(session_id, matcher, intent = %intent.intent_label, "fast-path match");
            intent
        } else {
            self.resolve_with_model(command, &normalized, context, cancel)
                .await?
        };

        Ok(self.attach_resource_id(intent).await)
    }

    async fn resolve_with_model(
        &self,
        command: &Command,
        normalized: &str,
        context: &ConversationLog,
        cancel: &CancellationToken,
    ) -> Result<ResolvedIntent, ResolveError> {
        let session_id = command.session_id.as_str();

        if let Some(invoker) = &self.invoker {
            let history = context.window(self.history_turns);
            let prompt = Prompt::text(build_intent_prompt(
                normalized,
                &history,
                command.page_context.as_deref(),
            ));
            let invocation = tokio::time::timeout(
                self.model_deadline,
                invoker.invoke(&prompt, &self.candidates, cancel),
            );
            match invocation.await {
                Err(_) => warn!(
                    session_id,
                    deadline_ms = self.model_deadline.as_millis() as u64,
                    "model intent resolution timed out"
                ),
                Ok(Ok(output)) => match parse_model_intent(&output.text) {
                    Ok(intent) if intent.action != Action::Unknown => {
                        info!(
                            session_id,
                            candidate = %output.candidate,
                            intent = %intent.intent_label,
                            action = %intent.action,
                            "model resolved intent"
                        );
                        return Ok(intent);
                    }
                    Ok(_) => debug!(session_id, "model returned unknown action"),
                    Err(e) => warn!(session_id, error = %e, "model intent rejected"),
                },
                Ok(Err(InvocationError::Cancelled)) => return Err(ResolveError::Cancelled),
                Ok(Err(e)) => warn!(
                    session_id,
                    error = %e,
                    overloaded = e.is_overloaded(),
                    "model unavailable for intent resolution"
                ),
            }
        }

        if let Some(intent) = vocabulary_scan(normalized) {
            info!(session_id, intent = %intent.intent_label, "keyword scan resolved intent");
            return Ok(intent);
        }

        info!(session_id, "command not understood");
        Ok(ResolvedIntent::unknown())
    }

    /// Add `resource_id` when subject and semester identify one resource.
    /// Lookup failures only log.
    async fn attach_resource_id(&self, mut intent: ResolvedIntent) -> ResolvedIntent {
        if !matches!(
            intent.action,
            Action::DownloadResource | Action::OpenResourceList
        ) || intent.param(params::RESOURCE_ID).is_some()
        {
            return intent;
        }
        let query = ResourceQuery::from_intent(&intent);
        if !query.is_specific() {
            return intent;
        }

        match tokio::time::timeout(LOOKUP_TIMEOUT, self.directory.find_resource(&query)).await {
            Ok(Ok(Some(id))) => {
                debug!(resource_id = %id, "resource lookup hit");
                intent.parameters.insert(params::RESOURCE_ID.to_owned(), id);
            }
            Ok(Ok(None)) => debug!(?query, "no matching resource"),
            Ok(Err(e)) => warn!(error = %e, "resource lookup failed"),
            Err(_) => warn!("resource lookup timed out"),
        }
        intent
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::intent::resources::{DirectoryError, ResourceEntry, ResourceKind, StaticResourceDirectory};
    use crate::intent::labels;
    use crate::llm::{ModelBackend, ModelError, ModelRequest, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that counts calls and replies with a fixed result.
    struct CountingBackend {
        calls: AtomicUsize,
        reply: Result<String, ModelError>,
    }

    impl CountingBackend {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Ok(text.to_owned()),
            })
        }

        fn failing(error: ModelError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Err(error),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn resolver(backend: &Arc<CountingBackend>) -> IntentResolver {
        let invoker = ModelInvoker::new(
            Arc::clone(backend) as Arc<dyn ModelBackend>,
            RetryPolicy::default(),
        );
        IntentResolver::with_model(invoker, vec![ModelCandidate::new("primary", 1)])
    }

    async fn resolve(resolver: &IntentResolver, text: &str) -> Result<ResolvedIntent, ResolveError> {
        resolver
            .resolve(
                &Command::new(text, "s1"),
                &ConversationLog::default(),
                &CancellationToken::new(),
            )
            .await
    }

    #[tokio::test]
    async fn blank_command_is_rejected_before_any_call() {
        let backend = CountingBackend::replying("{}");
        let resolver = resolver(&backend);
        for text in ["", "   ", "\n\t"] {
            assert_eq!(resolve(&resolver, text).await, Err(ResolveError::EmptyCommand));
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn fast_path_never_calls_the_model() {
        let backend = CountingBackend::replying("{}");
        let resolver = resolver(&backend);
        for text in [
            "download py for AI sem 5",
            "srb",
            "ask srb about attendance requirements",
            "check my attendance",
            "take me to my profile",
            "ask tutor about recursion",
            "exams",
        ] {
            let intent = resolve(&resolver, text).await.unwrap();
            assert_ne!(intent.action, Action::Unknown, "input: {text}");
        }
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn model_resolves_unmatched_command() {
        let backend = CountingBackend::replying(
            r#"{"intent":"check-results","action":"check-results","parameters":{},"response":"Pulling up your grades."}"#,
        );
        let resolver = resolver(&backend);
        let intent = resolve(&resolver, "did i pass everything last term").await.unwrap();
        assert_eq!(intent.action, Action::CheckResults);
        assert_eq!(intent.spoken_response, "Pulling up your grades.");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_model_output_falls_back_to_keyword_scan() {
        let backend = CountingBackend::replying("You probably mean the rules.");
        let resolver = resolver(&backend);
        let intent = resolve(&resolver, "tell me about hostel rules").await.unwrap();
        assert_eq!(intent.intent_label, labels::ASK_RULE_BOOK);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn failed_model_and_scan_yield_unknown() {
        let backend = CountingBackend::failing(ModelError::Http {
            status: 400,
            message: "bad request".into(),
        });
        let resolver = resolver(&backend);
        let intent = resolve(&resolver, "sing me a song").await.unwrap();
        assert_eq!(intent, ResolvedIntent::unknown());
    }

    #[tokio::test]
    async fn deterministic_resolver_returns_unknown_without_model() {
        let intent = resolve(&IntentResolver::deterministic(), "sing me a song")
            .await
            .unwrap();
        assert_eq!(intent.action, Action::Unknown);
    }

    #[tokio::test]
    async fn cancelled_model_call_reports_cancellation() {
        let backend = CountingBackend::replying("{}");
        let resolver = resolver(&backend);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = resolver
            .resolve(
                &Command::new("sing me a song", "s1"),
                &ConversationLog::default(),
                &cancel,
            )
            .await;
        assert_eq!(result, Err(ResolveError::Cancelled));
    }

    struct StalledBackend;

    #[async_trait]
    impl ModelBackend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_model_falls_through_to_keyword_scan_at_deadline() {
        let invoker = ModelInvoker::new(Arc::new(StalledBackend), RetryPolicy::default());
        let resolver = IntentResolver::with_model(
            invoker,
            vec![ModelCandidate::new("primary", 3), ModelCandidate::new("secondary", 2)],
        )
        .with_model_deadline(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        let intent = resolve(&resolver, "tell me about hostel rules").await.unwrap();
        assert_eq!(intent.intent_label, labels::ASK_RULE_BOOK);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited < Duration::from_secs(6), "{waited:?}");

        let intent = resolve(&resolver, "sing me a song").await.unwrap();
        assert_eq!(intent, ResolvedIntent::unknown());
    }

    #[tokio::test]
    async fn resource_lookup_adds_id_when_found() {
        let directory = StaticResourceDirectory::new(vec![ResourceEntry {
            id: "pyq-ai-5".into(),
            kind: ResourceKind::Pyq,
            subject: "Artificial Intelligence".into(),
            semester: "5".into(),
        }]);
        let resolver = IntentResolver::deterministic().with_directory(Arc::new(directory));

        let intent = resolve(&resolver, "download py for AI sem 5").await.unwrap();
        assert_eq!(intent.param(params::RESOURCE_ID), Some("pyq-ai-5"));

        let intent = resolve(&resolver, "download py for AI sem 6").await.unwrap();
        assert_eq!(intent.param(params::RESOURCE_ID), None);
        assert_eq!(intent.param(params::SEMESTER), Some("6"));
    }

    struct BrokenDirectory;

    #[async_trait]
    impl ResourceDirectory for BrokenDirectory {
        async fn find_resource(&self, _query: &ResourceQuery) -> Result<Option<String>, DirectoryError> {
            Err(DirectoryError("index offline".into()))
        }
    }

    #[tokio::test]
    async fn lookup_failure_never_blocks_the_intent() {
        let resolver = IntentResolver::deterministic().with_directory(Arc::new(BrokenDirectory));
        let intent = resolve(&resolver, "download py for AI sem 5").await.unwrap();
        assert_eq!(intent.action, Action::DownloadResource);
        assert_eq!(intent.param(params::SUBJECT), Some("Artificial Intelligence"));
        assert_eq!(intent.param(params::RESOURCE_ID), None);
    }
}
