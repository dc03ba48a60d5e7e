//! Model invocation layer.
//!
//! One algorithm for every language-model call in the assistant: ordered
//! candidate fallback, bounded per-candidate retry with exponential backoff,
//! configurable transient/terminal classification, and cancellation that
//! reaches into backoff sleeps.
//!
//! - [`backend`]: the single-call [`ModelBackend`] trait and request types
//! - [`http`]: generate-content HTTP backend
//! - [`classify`]: transient vs terminal policy
//! - [`retry`]: backoff schedule
//! - [`fallback`]: per-invocation candidate chain
//! - [`invoker`]: the invocation loop

pub mod backend;
pub mod classify;
pub mod error;
pub mod fallback;
pub mod http;
pub mod invoker;
pub mod retry;

pub use backend::{MediaPart, ModelBackend, ModelRequest, Prompt};
pub use classify::{FailureClassifier, FailureKind, OverloadPolicy};
pub use error::{AggregatedFailure, InvocationError, ModelError};
pub use fallback::{CandidateChain, ModelCandidate};
pub use http::HttpModelBackend;
pub use invoker::{AttemptOutcome, InvocationAttempt, InvocationOutput, ModelInvoker};
pub use retry::RetryPolicy;
