//! Command intake: resolve, record, dispatch.
//!
//! [`AssistantPipeline`] is the one place typed and spoken commands enter.
//! It owns the per-session history and wires the resolver to the dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::CommandHandler;
use crate::config::AssistantConfig;
use crate::conversation::{ConversationRegistry, ConversationTurn};
use crate::dispatch::{ActionDispatcher, AlertSource, Dispatched, NoAlerts, StaticAlerts};
use crate::error::{AssistantError, Result};
use crate::host::contract::{CommandRequest, CommandResponse};
use crate::intent::{
    Command, IntentResolver, NoResourceDirectory, ResourceDirectory, StaticResourceDirectory,
};
use crate::knowledge::{FsDocumentStore, KnowledgeCache, ModelExtractor};
use crate::llm::{ModelCandidate, ModelInvoker};
use crate::runtime::RuntimeEvent;

const EVENT_CAPACITY: usize = 128;

/// Resolver, dispatcher and conversation state behind one entry point.
#[derive(Clone)]
pub struct AssistantPipeline {
    resolver: Arc<IntentResolver>,
    dispatcher: Arc<ActionDispatcher>,
    conversations: ConversationRegistry,
    events: broadcast::Sender<RuntimeEvent>,
}

impl std::fmt::Debug for AssistantPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantPipeline")
            .field("resolver", &self.resolver)
            .field("dispatcher", &self.dispatcher)
            .field("sessions", &self.conversations.session_count())
            .finish_non_exhaustive()
    }
}

impl AssistantPipeline {
    pub fn new(
        resolver: IntentResolver,
        dispatcher: ActionDispatcher,
        conversations: ConversationRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            resolver: Arc::new(resolver),
            dispatcher: Arc::new(dispatcher),
            conversations,
            events,
        }
    }

    /// Wire the full HTTP-backed pipeline from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if the model backend, resource index
    /// or alerts file cannot be set up, and [`AssistantError::Knowledge`] if
    /// the document store directory cannot be created.
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let invoker = ModelInvoker::from_config(&config.model)
            .map_err(|e| AssistantError::Config(e.to_string()))?;
        let candidates = ModelCandidate::from_config(&config.model.candidates);

        let store = FsDocumentStore::new(&config.knowledge.store_dir)?;
        let extractor = ModelExtractor::new(invoker.clone(), candidates.clone());
        let knowledge = KnowledgeCache::new(&config.knowledge, Arc::new(store), Arc::new(extractor));

        let directory: Arc<dyn ResourceDirectory> = match &config.dispatch.resource_index {
            Some(path) => Arc::new(
                StaticResourceDirectory::from_file(path)
                    .map_err(|e| AssistantError::Config(e.to_string()))?,
            ),
            None => Arc::new(NoResourceDirectory),
        };
        let alerts: Arc<dyn AlertSource> = match &config.dispatch.alerts_file {
            Some(path) => Arc::new(
                StaticAlerts::from_file(path).map_err(|e| AssistantError::Config(e.to_string()))?,
            ),
            None => Arc::new(NoAlerts),
        };

        let resolver = IntentResolver::with_model(invoker.clone(), candidates.clone())
            .with_directory(directory)
            .with_history_turns(config.conversation.window)
            .with_model_deadline(config.intent.model_deadline());
        let dispatcher = ActionDispatcher::new(config.dispatch.clone())
            .with_model(invoker, candidates)
            .with_knowledge(Arc::new(knowledge))
            .with_alerts(alerts);

        info!(
            candidates = config.model.candidates.len(),
            window = config.conversation.window,
            "assistant pipeline ready"
        );
        Ok(Self::new(
            resolver,
            dispatcher,
            ConversationRegistry::new(config.conversation.window),
        ))
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

    pub fn conversations(&self) -> &ConversationRegistry {
        &self.conversations
    }

    /// Forget a session's history. Called when its assistant panel closes.
    pub fn close_session(&self, session_id: &str) {
        if self.conversations.close(session_id) {
            info!(session_id, "session closed");
            let _ = self.events.send(RuntimeEvent::SessionClosed {
                session_id: session_id.to_owned(),
            });
        }
    }

    /// Handle one command end to end. Never fails; problems become
    /// `success: false` responses or spoken outcomes.
    pub async fn handle_command(
        &self,
        request: CommandRequest,
        cancel: &CancellationToken,
    ) -> CommandResponse {
        let CommandRequest {
            command,
            session_id,
            current_page_context,
            conversation_history,
            request_id,
            close_session,
        } = request;

        if close_session {
            self.close_session(&session_id);
            return CommandResponse::closed().with_request_id(request_id);
        }

        if let Some(turns) = conversation_history {
            self.conversations.seed(&session_id, turns);
        }
        let history = self.conversations.snapshot(&session_id);

        let mut input = Command::new(command.clone(), session_id.clone());
        input.page_context = current_page_context;

        let intent = match self.resolver.resolve(&input, &history, cancel).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "command rejected");
                return CommandResponse::error(e.user_message()).with_request_id(request_id);
            }
        };

        let _ = self.events.send(RuntimeEvent::IntentResolved {
            session_id: session_id.clone(),
            intent_label: intent.intent_label.clone(),
            action: intent.action,
        });

        let Dispatched { intent, outcome } = self
            .dispatcher
            .dispatch(intent, &session_id, &history, cancel)
            .await;

        self.conversations
            .append(&session_id, ConversationTurn::user(command.trim()));
        self.conversations.append(
            &session_id,
            ConversationTurn::assistant(outcome.spoken_response.clone()),
        );

        CommandResponse::ok(intent, outcome).with_request_id(request_id)
    }
}

#[async_trait]
impl CommandHandler for AssistantPipeline {
    async fn handle_transcript(
        &self,
        session_id: &str,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let response = self
            .handle_command(CommandRequest::new(transcript, session_id), cancel)
            .await;
        response.response.or(response.error)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::DispatchConfig;
    use crate::conversation::Role;
    use crate::dispatch::Effect;
    use crate::intent::Action;
    use crate::llm::RetryPolicy;
    use crate::test_utils::ScriptedBackend;

    fn deterministic() -> AssistantPipeline {
        AssistantPipeline::new(
            IntentResolver::deterministic(),
            ActionDispatcher::new(DispatchConfig::default()),
            ConversationRegistry::new(5),
        )
    }

    #[tokio::test]
    async fn fast_path_command_is_resolved_dispatched_and_recorded() {
        let pipeline = deterministic();
        let mut events = pipeline.subscribe();
        let response = pipeline
            .handle_command(
                CommandRequest::new("download py for AI sem 5", "s1"),
                &CancellationToken::new(),
            )
            .await;

        assert!(response.success);
        let intent = response.command.unwrap();
        assert_eq!(intent.action, Action::DownloadResource);
        let outcome = response.outcome.unwrap();
        assert!(outcome.degraded);
        assert!(matches!(outcome.effect, Effect::ShowResourceList { .. }));
        assert_eq!(response.response.as_deref(), Some(outcome.spoken_response.as_str()));

        let log = pipeline.conversations().snapshot("s1");
        let turns = log.window(5);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "download py for AI sem 5");

        assert!(matches!(
            events.try_recv().unwrap(),
            RuntimeEvent::IntentResolved { action: Action::DownloadResource, .. }
        ));
    }

    #[tokio::test]
    async fn empty_command_is_an_error_response() {
        let pipeline = deterministic();
        let mut request = CommandRequest::new("   ", "s1");
        request.request_id = Some("r-7".into());
        let response = pipeline.handle_command(request, &CancellationToken::new()).await;
        assert!(!response.success);
        assert!(response.error.is_some());
        assert_eq!(response.request_id.as_deref(), Some("r-7"));
        assert_eq!(pipeline.conversations().snapshot("s1").len(), 0);
    }

    #[tokio::test]
    async fn supplied_history_replaces_session_log() {
        let pipeline = deterministic();
        pipeline
            .conversations()
            .append("s1", ConversationTurn::user("old"));
        let request = CommandRequest::new("check attendance", "s1").with_history(vec![
            ConversationTurn::user("ask srb about exams"),
            ConversationTurn::assistant("Exams are in May."),
        ]);
        pipeline.handle_command(request, &CancellationToken::new()).await;

        let contents: Vec<String> = pipeline
            .conversations()
            .snapshot("s1")
            .window(10)
            .into_iter()
            .map(|t| t.content)
            .collect();
        assert_eq!(contents[0], "ask srb about exams");
        assert!(!contents.contains(&"old".to_owned()));
        assert_eq!(contents.len(), 4);
    }

    #[tokio::test]
    async fn close_request_drops_the_session() {
        let pipeline = deterministic();
        let cancel = CancellationToken::new();
        pipeline
            .handle_command(CommandRequest::new("check attendance", "s1"), &cancel)
            .await;
        pipeline
            .handle_command(CommandRequest::new("srb", "s2"), &cancel)
            .await;
        assert_eq!(pipeline.conversations().session_count(), 2);

        let mut events = pipeline.subscribe();
        let mut close = CommandRequest::close("s1");
        close.request_id = Some("bye".into());
        let response = pipeline.handle_command(close, &cancel).await;
        assert!(response.success);
        assert!(response.command.is_none());
        assert_eq!(response.request_id.as_deref(), Some("bye"));
        assert_eq!(pipeline.conversations().session_count(), 1);
        assert!(pipeline.conversations().snapshot("s1").is_empty());
        assert_eq!(
            events.try_recv().unwrap(),
            RuntimeEvent::SessionClosed { session_id: "s1".into() }
        );

        // Closing an unknown session is acknowledged without an event.
        assert!(pipeline.handle_command(CommandRequest::close("nope"), &cancel).await.success);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn transcript_handler_returns_spoken_line() {
        let backend = Arc::new(ScriptedBackend::replying(
            r#"{"intent":"check-results","action":"check-results","parameters":{},"response":"Opening your results."}"#,
        ));
        let invoker = ModelInvoker::new(backend.clone(), RetryPolicy::default());
        let pipeline = AssistantPipeline::new(
            IntentResolver::with_model(invoker, vec![ModelCandidate::new("primary", 1)]),
            ActionDispatcher::new(DispatchConfig::default()),
            ConversationRegistry::new(5),
        );

        let spoken = pipeline
            .handle_transcript("s2", "how did I do this term", &CancellationToken::new())
            .await;
        assert_eq!(spoken.as_deref(), Some("Opening your results."));
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn from_config_wires_files() {
        let dir = tempfile::tempdir().unwrap();
        let index = dir.path().join("resources.json");
        std::fs::write(
            &index,
            r#"[{"id":"r1","kind":"pyq","subject":"Operating Systems","semester":"4"}]"#,
        )
        .unwrap();

        let mut config = AssistantConfig::default();
        config.knowledge.store_dir = dir.path().join("store");
        config.dispatch.resource_index = Some(index);
        assert!(AssistantPipeline::from_config(&config).is_ok());

        config.dispatch.alerts_file = Some(dir.path().join("missing.json"));
        assert!(matches!(
            AssistantPipeline::from_config(&config),
            Err(AssistantError::Config(_))
        ));
    }
}
