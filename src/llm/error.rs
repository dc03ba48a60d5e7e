//! Error types for the model invocation layer.
//!
//! Each [`ModelError`] variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`ModelError::code()`].

use super::invoker::InvocationAttempt;

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// The backend answered with a non-success HTTP status.
    pub const HTTP_STATUS: &str = "HTTP_STATUS";

    /// The request never produced an HTTP response (connect, timeout, TLS).
    pub const TRANSPORT_FAILED: &str = "TRANSPORT_FAILED";

    /// The backend answered successfully but without any text.
    pub const EMPTY_RESPONSE: &str = "EMPTY_RESPONSE";

    /// The backend answered with a body that could not be decoded.
    pub const MALFORMED_RESPONSE: &str = "MALFORMED_RESPONSE";

    /// Invalid or missing backend configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
}

/// A single failed call to one backend candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Non-success HTTP status with the backend's error message.
    #[error("[{}] HTTP {status}: {message}", error_codes::HTTP_STATUS)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// Request could not be completed.
    #[error("[{}] {}", error_codes::TRANSPORT_FAILED, .0)]
    Transport(String),

    /// Response contained no usable text.
    #[error("[{}] {}", error_codes::EMPTY_RESPONSE, .0)]
    EmptyResponse(String),

    /// Response body did not match the expected shape.
    #[error("[{}] {}", error_codes::MALFORMED_RESPONSE, .0)]
    Malformed(String),

    /// Backend misconfiguration (missing key, bad URL).
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),
}

impl ModelError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http { .. } => error_codes::HTTP_STATUS,
            Self::Transport(_) => error_codes::TRANSPORT_FAILED,
            Self::EmptyResponse(_) => error_codes::EMPTY_RESPONSE,
            Self::Malformed(_) => error_codes::MALFORMED_RESPONSE,
            Self::Config(_) => error_codes::CONFIG_INVALID,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Http { message, .. } => message,
            Self::Transport(m) | Self::EmptyResponse(m) | Self::Malformed(m) | Self::Config(m) => m,
        }
    }

    /// HTTP status, when the failure came with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Every candidate was tried and none produced text.
#[derive(Debug, Clone)]
pub struct AggregatedFailure {
    /// Error from the final attempt.
    pub last_error: ModelError,
    /// The final attempt itself.
    pub last_attempt: InvocationAttempt,
    /// Every attempt made, in order.
    pub attempts: Vec<InvocationAttempt>,
    /// Whether transient (overload) failures dominated the attempt log.
    pub overloaded: bool,
}

/// Outcome of a whole invocation that did not yield text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    /// All candidates exhausted.
    #[error("all model candidates failed (last: {}): {}", .0.last_attempt.candidate, .0.last_error)]
    Exhausted(Box<AggregatedFailure>),

    /// The candidate list was empty.
    #[error("no model candidates configured")]
    NoCandidates,

    /// The caller cancelled the invocation (possibly mid-backoff).
    #[error("model invocation cancelled")]
    Cancelled,
}

impl InvocationError {
    /// True when the dominant failure mode was overload / rate limiting.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Exhausted(failure) if failure.overloaded)
    }

    /// Short sentence suitable for speaking back to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Exhausted(failure) if failure.overloaded => {
                "The assistant service is busy right now. Please try again in a moment."
            }
            Self::Cancelled => "Okay, cancelled.",
            _ => "Sorry, I couldn't reach the assistant service.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::invoker::AttemptOutcome;
    use std::time::Duration;

    fn attempt(candidate: &str) -> InvocationAttempt {
        InvocationAttempt {
            candidate: candidate.to_owned(),
            attempt_number: 1,
            outcome: AttemptOutcome::TransientFailure,
            latency: Duration::from_millis(5),
        }
    }

    #[test]
    fn http_error_display_includes_code_and_status() {
        let err = ModelError::Http {
            status: 503,
            message: "The model is overloaded".into(),
        };
        assert_eq!(err.to_string(), "[HTTP_STATUS] HTTP 503: The model is overloaded");
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.message(), "The model is overloaded");
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ModelError::Transport("x".into()).code(), "TRANSPORT_FAILED");
        assert_eq!(ModelError::EmptyResponse("x".into()).code(), "EMPTY_RESPONSE");
        assert_eq!(ModelError::Malformed("x".into()).code(), "MALFORMED_RESPONSE");
        assert_eq!(ModelError::Config("x".into()).code(), "CONFIG_INVALID");
        assert_eq!(ModelError::Config("x".into()).status(), None);
    }

    #[test]
    fn overloaded_exhaustion_gives_busy_message() {
        let err = InvocationError::Exhausted(Box::new(AggregatedFailure {
            last_error: ModelError::Http {
                status: 503,
                message: "overloaded".into(),
            },
            last_attempt: attempt("b"),
            attempts: vec![attempt("a"), attempt("b")],
            overloaded: true,
        }));
        assert!(err.is_overloaded());
        assert!(err.user_message().contains("busy"));
        assert!(err.to_string().contains("last: b"));
    }

    #[test]
    fn non_overloaded_errors_give_generic_message() {
        assert!(!InvocationError::NoCandidates.is_overloaded());
        assert!(!InvocationError::NoCandidates.user_message().contains("busy"));
        assert_eq!(InvocationError::Cancelled.user_message(), "Okay, cancelled.");
    }
}
