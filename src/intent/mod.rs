//! Intent resolution: free text to a structured, dispatchable intent.
//!
//! Deterministic matchers run first over normalized text; only when none
//! fires is the language model consulted, and its output is validated
//! against a fixed schema before use.

pub mod matchers;
pub mod normalize;
pub mod parse;
pub mod prompt;
pub mod resolver;
pub mod resources;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use normalize::{canonical_subject, normalize};
pub use resolver::IntentResolver;
pub use resources::{
    NoResourceDirectory, ResourceDirectory, ResourceEntry, ResourceKind, ResourceQuery,
    StaticResourceDirectory,
};

/// Parameter keys shared by the resolver and the dispatcher.
pub mod params {
    /// Subject name, canonicalized (e.g. `"Artificial Intelligence"`).
    pub const SUBJECT: &str = "subject";
    /// Semester number as a string.
    pub const SEMESTER: &str = "semester";
    /// Concrete resource id found by the directory lookup.
    pub const RESOURCE_ID: &str = "resource_id";
    /// Resource kind override (`pyq`, `notes`, `syllabus`).
    pub const RESOURCE_TYPE: &str = "type";
    /// Portal page to navigate to.
    pub const PAGE: &str = "page";
    /// Free-text question for a domain query.
    pub const QUESTION: &str = "question";
}

/// Intent labels with dispatch meaning beyond their action.
pub mod labels {
    /// Domain query against the student rule book.
    pub const ASK_RULE_BOOK: &str = "ask-srb";
    /// Domain query for the study assistant.
    pub const ASK_TUTOR: &str = "ask-tutor";
    /// Open the student rule book section.
    pub const OPEN_RULE_BOOK: &str = "open-srb";
    /// Fallback when nothing was understood.
    pub const UNKNOWN: &str = "unknown";
}

/// The fixed action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Navigate,
    CheckAttendance,
    CheckSchedule,
    CheckResults,
    OpenResourceList,
    OpenResource,
    DownloadResource,
    DomainQuery,
    CheckAlerts,
    Unknown,
}

impl Action {
    /// Every action, in prompt order.
    pub const ALL: [Action; 10] = [
        Action::Navigate,
        Action::CheckAttendance,
        Action::CheckSchedule,
        Action::CheckResults,
        Action::OpenResourceList,
        Action::OpenResource,
        Action::DownloadResource,
        Action::DomainQuery,
        Action::CheckAlerts,
        Action::Unknown,
    ];

    /// Wire label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::CheckAttendance => "check-attendance",
            Self::CheckSchedule => "check-schedule",
            Self::CheckResults => "check-results",
            Self::OpenResourceList => "open-resource-list",
            Self::OpenResource => "open-resource",
            Self::DownloadResource => "download-resource",
            Self::DomainQuery => "domain-query",
            Self::CheckAlerts => "check-alerts",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire label. Accepts `_` in place of `-` and any case.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|a| a.as_str() == wanted)
    }

    /// One-line description used when prompting the model.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Navigate => "go to a portal page; parameters: page",
            Self::CheckAttendance => "show the student's attendance",
            Self::CheckSchedule => "show today's class schedule or timetable",
            Self::CheckResults => "show exam results or grades",
            Self::OpenResourceList => {
                "list study resources; parameters: subject, semester, type (pyq|notes|syllabus)"
            }
            Self::OpenResource => "open a specific document section such as the rule book",
            Self::DownloadResource => {
                "download a study resource; parameters: subject, semester, type (pyq|notes|syllabus)"
            }
            Self::DomainQuery => {
                "answer a question; intent ask-srb for rule-book questions, ask-tutor for study questions; parameters: question"
            }
            Self::CheckAlerts => "read out alerts, notices and deadlines",
            Self::Unknown => "the request cannot be mapped to any other action",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which knowledge domain a domain query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryDomain {
    /// Student rule book, grounded on the cached document text.
    RuleBook,
    /// General study assistance.
    Study,
}

impl QueryDomain {
    /// Domain implied by an intent label.
    #[must_use]
    pub fn from_intent(intent_label: &str) -> Self {
        let lower = intent_label.to_ascii_lowercase();
        if lower.contains("srb") || lower.contains("rule") {
            Self::RuleBook
        } else {
            Self::Study
        }
    }
}

/// One utterance to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Raw text as captured or typed.
    pub text: String,
    /// Session the command came from.
    pub session_id: String,
    /// Portal page the user was on, if known.
    pub page_context: Option<String>,
}

impl Command {
    /// Build a command without page context.
    pub fn new(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            page_context: None,
        }
    }

    /// Attach the current page context.
    #[must_use]
    pub fn with_page_context(mut self, page: impl Into<String>) -> Self {
        self.page_context = Some(page.into());
        self
    }
}

/// A resolved, immutable intent. Consumed by value when dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIntent {
    /// Intent label (e.g. `"download-pyq"`, `"ask-srb"`).
    pub intent_label: String,
    /// Action from the fixed vocabulary.
    pub action: Action,
    /// String parameters for the action.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Acknowledgement to speak back.
    pub spoken_response: String,
}

impl ResolvedIntent {
    /// Build an intent with no parameters.
    pub fn new(
        intent_label: impl Into<String>,
        action: Action,
        spoken_response: impl Into<String>,
    ) -> Self {
        Self {
            intent_label: intent_label.into(),
            action,
            parameters: BTreeMap::new(),
            spoken_response: spoken_response.into(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_owned(), value.into());
        self
    }

    /// Parameter value, if present and non-blank.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// The explicit "didn't understand" intent.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(
            labels::UNKNOWN,
            Action::Unknown,
            "Sorry, I didn't understand that. Try \"check my attendance\" or \"download pyq for AI semester 5\".",
        )
    }
}

/// Resolution failures surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Blank command, rejected before any matcher or model call.
    #[error("command is empty")]
    EmptyCommand,

    /// The caller cancelled while the model was being consulted.
    #[error("resolution cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Short sentence suitable for speaking back to the user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyCommand => "Please say or type a command.",
            Self::Cancelled => "Okay, cancelled.",
        }
    }
}
