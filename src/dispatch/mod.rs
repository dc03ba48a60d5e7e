//! Action dispatch: one resolved intent in, one effect plus a spoken line out.
//!
//! Most actions are local mappings from parameters to an [`Effect`]. Only
//! `domain-query` (model, and the knowledge cache for the rule book) and
//! `check-alerts` do asynchronous work, each under its own deadline.
//! Failures never escape: they become spoken outcomes.

pub mod alerts;
pub mod domain;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use alerts::{Alert, AlertError, AlertSource, NoAlerts, StaticAlerts};

use crate::config::DispatchConfig;
use crate::conversation::{ConversationLog, mentions_any};
use crate::intent::{Action, QueryDomain, ResolvedIntent, ResourceQuery, labels, params};
use crate::knowledge::{KnowledgeCache, KnowledgeError};
use crate::llm::{InvocationError, ModelCandidate, ModelInvoker, Prompt};

/// What the portal should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Effect {
    Navigate { page: String },
    ShowAttendance,
    ShowSchedule,
    ShowResults,
    ShowResourceList { filter: ResourceQuery },
    OpenResource { section: String },
    DownloadResource { resource_id: String, filter: ResourceQuery },
    Answer { domain: QueryDomain, question: String },
    ShowAlerts { alerts: Vec<Alert> },
    None,
}

/// Why an action could not complete as asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchFailure {
    /// The model service was overloaded.
    Busy,
    /// A reference document is still being extracted.
    ExtractionTimeout,
    /// The action exceeded its own deadline.
    Timeout,
    /// The caller cancelled.
    Cancelled,
    /// Anything else.
    Unavailable,
}

/// Result of dispatching one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub effect: Effect,
    /// Line to speak back; replaces the resolver's acknowledgement.
    pub spoken_response: String,
    /// The action was downgraded (e.g. download to list).
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<DispatchFailure>,
}

impl DispatchOutcome {
    fn done(effect: Effect, spoken: impl Into<String>) -> Self {
        Self {
            effect,
            spoken_response: spoken.into(),
            degraded: false,
            failure: None,
        }
    }

    fn failed(failure: DispatchFailure, spoken: impl Into<String>) -> Self {
        Self {
            effect: Effect::None,
            spoken_response: spoken.into(),
            degraded: false,
            failure: Some(failure),
        }
    }
}

/// A dispatched intent together with what it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub intent: ResolvedIntent,
    pub outcome: DispatchOutcome,
}

const TIMEOUT_MESSAGE: &str = "That took too long. Please try again.";
const GENERIC_FAILURE: &str = "Sorry, I couldn't get an answer right now.";

/// Failure inside a domain query before it reaches a spoken outcome.
#[derive(Debug, thiserror::Error)]
enum DomainQueryError {
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("no model configured")]
    NoModel,
    #[error("no knowledge cache configured")]
    NoKnowledge,
    #[error("cancelled while loading the document")]
    Cancelled,
}

impl DomainQueryError {
    fn outcome(&self) -> DispatchOutcome {
        match self {
            Self::Knowledge(e @ KnowledgeError::ExtractionTimeout { .. }) => {
                DispatchOutcome::failed(DispatchFailure::ExtractionTimeout, e.user_message())
            }
            Self::Knowledge(e @ KnowledgeError::Overloaded(_)) => {
                DispatchOutcome::failed(DispatchFailure::Busy, e.user_message())
            }
            Self::Knowledge(e) => DispatchOutcome::failed(DispatchFailure::Unavailable, e.user_message()),
            Self::Invocation(InvocationError::Cancelled) | Self::Cancelled => {
                DispatchOutcome::failed(DispatchFailure::Cancelled, InvocationError::Cancelled.user_message())
            }
            Self::Invocation(e) if e.is_overloaded() => {
                DispatchOutcome::failed(DispatchFailure::Busy, e.user_message())
            }
            Self::Invocation(_) | Self::NoModel | Self::NoKnowledge => {
                DispatchOutcome::failed(DispatchFailure::Unavailable, GENERIC_FAILURE)
            }
        }
    }
}

/// Maps resolved intents to effects.
#[derive(Clone)]
pub struct ActionDispatcher {
    config: DispatchConfig,
    invoker: Option<ModelInvoker>,
    candidates: Vec<ModelCandidate>,
    knowledge: Option<Arc<KnowledgeCache>>,
    alerts: Arc<dyn AlertSource>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("config", &self.config)
            .field("model_enabled", &self.invoker.is_some())
            .field("knowledge_enabled", &self.knowledge.is_some())
            .finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    /// Dispatcher with only local actions; domain queries report unavailability.
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            invoker: None,
            candidates: Vec::new(),
            knowledge: None,
            alerts: Arc::new(NoAlerts),
        }
    }

    #[must_use]
    pub fn with_model(mut self, invoker: ModelInvoker, candidates: Vec<ModelCandidate>) -> Self {
        self.invoker = Some(invoker);
        self.candidates = candidates;
        self
    }

    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeCache>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    #[must_use]
    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSource>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Dispatch `intent`. It is taken by value and handed back alongside
    /// the outcome, so the same intent cannot be dispatched twice.
    pub async fn dispatch(
        &self,
        intent: ResolvedIntent,
        session_id: &str,
        history: &ConversationLog,
        cancel: &CancellationToken,
    ) -> Dispatched {
        info!(session_id, intent = %intent.intent_label, action = %intent.action, "dispatching");
        let outcome = self.outcome_for(&intent, session_id, history, cancel).await;
        Dispatched { intent, outcome }
    }

    async fn outcome_for(
        &self,
        intent: &ResolvedIntent,
        session_id: &str,
        history: &ConversationLog,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let spoken = intent.spoken_response.as_str();
        match intent.action {
            Action::Navigate => {
                let page = intent.param(params::PAGE).unwrap_or("dashboard").to_owned();
                DispatchOutcome::done(Effect::Navigate { page }, spoken)
            }
            Action::CheckAttendance => DispatchOutcome::done(Effect::ShowAttendance, spoken),
            Action::CheckSchedule => DispatchOutcome::done(Effect::ShowSchedule, spoken),
            Action::CheckResults => DispatchOutcome::done(Effect::ShowResults, spoken),
            Action::OpenResourceList => {
                let filter = ResourceQuery::from_intent(intent);
                DispatchOutcome::done(Effect::ShowResourceList { filter }, spoken)
            }
            Action::OpenResource => {
                let section = open_section(intent);
                DispatchOutcome::done(Effect::OpenResource { section }, spoken)
            }
            Action::DownloadResource => download(intent),
            Action::DomainQuery => self.domain_query(intent, history, cancel).await,
            Action::CheckAlerts => self.check_alerts(session_id, cancel).await,
            Action::Unknown => DispatchOutcome::done(Effect::None, spoken),
        }
    }

    async fn domain_query(
        &self,
        intent: &ResolvedIntent,
        history: &ConversationLog,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let Some(question) = intent.param(params::QUESTION).map(str::to_owned) else {
            return DispatchOutcome::done(Effect::None, "What would you like to ask?");
        };
        let domain = QueryDomain::from_intent(&intent.intent_label);
        let deadline = Duration::from_secs(self.config.domain_query_timeout_secs);

        let answer = tokio::time::timeout(deadline, self.answer(domain, &question, history, cancel)).await;
        match answer {
            Ok(Ok(text)) => DispatchOutcome::done(Effect::Answer { domain, question }, text.trim()),
            Ok(Err(e)) => {
                warn!(?domain, error = %e, "domain query failed");
                e.outcome()
            }
            Err(_) => {
                warn!(?domain, deadline_secs = deadline.as_secs(), "domain query timed out");
                DispatchOutcome::failed(DispatchFailure::Timeout, TIMEOUT_MESSAGE)
            }
        }
    }

    async fn answer(
        &self,
        target: QueryDomain,
        question: &str,
        history: &ConversationLog,
        cancel: &CancellationToken,
    ) -> Result<String, DomainQueryError> {
        let invoker = self.invoker.as_ref().ok_or(DomainQueryError::NoModel)?;
        let prompt = match target {
            QueryDomain::RuleBook => {
                let knowledge = self.knowledge.as_ref().ok_or(DomainQueryError::NoKnowledge)?;
                let document = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(DomainQueryError::Cancelled),
                    document = knowledge.get_document_text(&self.config.rule_book_source_key) => document?,
                };
                let relevant = history.window_filtered_by_topic(
                    domain::RULE_BOOK_RECALL,
                    mentions_any(domain::RULE_BOOK_TOPICS),
                );
                domain::rule_book_prompt(&document.text, &relevant, question)
            }
            QueryDomain::Study => domain::study_prompt(&history.window(domain::STUDY_RECALL), question),
        };
        let output = invoker
            .invoke(&Prompt::text(prompt), &self.candidates, cancel)
            .await?;
        Ok(output.text)
    }

    async fn check_alerts(&self, session_id: &str, cancel: &CancellationToken) -> DispatchOutcome {
        let deadline = Duration::from_secs(self.config.action_timeout_secs);
        let fetch = tokio::time::timeout(deadline, self.alerts.fetch_alerts(session_id));
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return DispatchOutcome::failed(
                    DispatchFailure::Cancelled,
                    InvocationError::Cancelled.user_message(),
                );
            }
            result = fetch => result,
        };
        match result {
            Ok(Ok(alerts)) => {
                let spoken = alerts::summarize(&alerts);
                DispatchOutcome::done(Effect::ShowAlerts { alerts }, spoken)
            }
            Ok(Err(e)) => {
                warn!(session_id, error = %e, "alert lookup failed");
                DispatchOutcome::failed(DispatchFailure::Unavailable, "Sorry, I couldn't check your alerts right now.")
            }
            Err(_) => {
                warn!(session_id, "alert lookup timed out");
                DispatchOutcome::failed(DispatchFailure::Timeout, TIMEOUT_MESSAGE)
            }
        }
    }
}

/// Download when a concrete id is known, otherwise degrade to the list.
fn download(intent: &ResolvedIntent) -> DispatchOutcome {
    let filter = ResourceQuery::from_intent(intent);
    match intent.param(params::RESOURCE_ID) {
        Some(id) => DispatchOutcome::done(
            Effect::DownloadResource {
                resource_id: id.to_owned(),
                filter,
            },
            intent.spoken_response.as_str(),
        ),
        None => {
            info!(?filter, "no resource id; showing list instead");
            let mut spoken = format!("Here are the {}", filter.kind.spoken().trim_start_matches("the "));
            if let Some(subject) = &filter.subject {
                spoken.push_str(&format!(" for {subject}"));
            }
            if let Some(semester) = &filter.semester {
                spoken.push_str(&format!(", semester {semester}"));
            }
            spoken.push('.');
            DispatchOutcome {
                effect: Effect::ShowResourceList { filter },
                spoken_response: spoken,
                degraded: true,
                failure: None,
            }
        }
    }
}

/// Section to open: explicit parameter, else implied by the label.
fn open_section(intent: &ResolvedIntent) -> String {
    if let Some(section) = intent.param("section") {
        return section.to_owned();
    }
    if intent.intent_label == labels::OPEN_RULE_BOOK {
        return "srb".to_owned();
    }
    intent
        .intent_label
        .strip_prefix("open-")
        .unwrap_or(&intent.intent_label)
        .to_owned()
}
