//! Wire types for command intake and host events.

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationTurn;
use crate::dispatch::DispatchOutcome;
use crate::intent::ResolvedIntent;
use crate::runtime::RuntimeEvent;

/// Contract version for event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// One command from the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Raw utterance, typed or transcribed. Unused when closing.
    #[serde(default)]
    pub command: String,
    pub session_id: String,
    /// Portal page the user was on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page_context: Option<String>,
    /// Replaces the server-side history for this session when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<ConversationTurn>>,
    /// Echoed back on the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// The assistant panel closed: drop the session instead of running a command.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub close_session: bool,
}

impl CommandRequest {
    #[must_use]
    pub fn new(command: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            session_id: session_id.into(),
            current_page_context: None,
            conversation_history: None,
            request_id: None,
            close_session: false,
        }
    }

    /// A request that ends `session_id`.
    #[must_use]
    pub fn close(session_id: impl Into<String>) -> Self {
        Self {
            close_session: true,
            ..Self::new(String::new(), session_id)
        }
    }

    #[must_use]
    pub fn with_page_context(mut self, page: impl Into<String>) -> Self {
        self.current_page_context = Some(page.into());
        self
    }

    #[must_use]
    pub fn with_history(mut self, turns: Vec<ConversationTurn>) -> Self {
        self.conversation_history = Some(turns);
        self
    }
}

/// Reply to one [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// The resolved intent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<ResolvedIntent>,
    /// Line to speak or display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// What the portal should do.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<DispatchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    /// Build a successful response.
    #[must_use]
    pub fn ok(intent: ResolvedIntent, outcome: DispatchOutcome) -> Self {
        Self {
            success: true,
            request_id: None,
            response: Some(outcome.spoken_response.clone()),
            command: Some(intent),
            outcome: Some(outcome),
            error: None,
        }
    }

    /// Acknowledge a closed session.
    #[must_use]
    pub fn closed() -> Self {
        Self {
            success: true,
            request_id: None,
            command: None,
            response: None,
            outcome: None,
            error: None,
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id: None,
            command: None,
            response: None,
            outcome: None,
            error: Some(message.into()),
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// A versioned event envelope from the pipeline to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }

    /// Wrap a runtime event under a fresh id.
    pub fn from_runtime(event: &RuntimeEvent) -> serde_json::Result<Self> {
        Ok(Self::new(
            uuid::Uuid::new_v4().to_string(),
            event.name(),
            serde_json::to_value(event)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::conversation::Role;
    use serde_json::json;

    #[test]
    fn request_accepts_minimal_camel_case_json() {
        let request: CommandRequest =
            serde_json::from_value(json!({"command": "srb", "sessionId": "s1"})).unwrap();
        assert_eq!(request, CommandRequest::new("srb", "s1"));
    }

    #[test]
    fn request_history_defaults_timestamps() {
        let request: CommandRequest = serde_json::from_value(json!({
            "command": "what about labs?",
            "sessionId": "s1",
            "currentPageContext": "attendance",
            "conversationHistory": [
                {"role": "user", "content": "ask srb about attendance"},
                {"role": "assistant", "content": "75% is required."}
            ]
        }))
        .unwrap();
        let history = request.conversation_history.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(request.current_page_context.as_deref(), Some("attendance"));
    }

    #[test]
    fn close_request_needs_no_command() {
        let request: CommandRequest =
            serde_json::from_value(json!({"sessionId": "s1", "closeSession": true})).unwrap();
        assert_eq!(request, CommandRequest::close("s1"));
        assert!(request.command.is_empty());

        let json = serde_json::to_value(CommandRequest::new("srb", "s1")).unwrap();
        assert!(json.get("closeSession").is_none());
    }

    #[test]
    fn error_response_omits_success_fields() {
        let json = serde_json::to_value(CommandResponse::error("command is empty")).unwrap();
        assert_eq!(json, json!({"success": false, "error": "command is empty"}));
    }

    #[test]
    fn runtime_event_wraps_with_wire_name() {
        let event = RuntimeEvent::SpokenResponse {
            session_id: "s1".into(),
            text: "Okay.".into(),
        };
        let envelope = EventEnvelope::from_runtime(&event).unwrap();
        assert_eq!(envelope.v, EVENT_VERSION);
        assert_eq!(envelope.event, "response.spoken");
        assert_eq!(envelope.payload["text"], "Okay.");
        assert!(!envelope.event_id.is_empty());
    }
}
