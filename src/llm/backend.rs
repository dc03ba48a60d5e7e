//! Backend trait for language-model calls.
//!
//! A [`ModelBackend`] turns one [`ModelRequest`] into text or a [`ModelError`].
//! It performs exactly one outbound call; retry and fallback live in the
//! invoker.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::ModelError;

/// Binary attachment sent alongside the prompt (e.g. a PDF for extraction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    /// MIME type such as `application/pdf`.
    pub mime_type: String,
    /// Raw bytes. Shared so retries do not copy large documents.
    pub data: Arc<[u8]>,
}

impl MediaPart {
    /// Create an attachment.
    pub fn new(mime_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }
}

/// Prompt plus optional attachments, independent of the target candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    /// Prompt text.
    pub text: String,
    /// Attached media, in order.
    pub media: Vec<MediaPart>,
}

impl Prompt {
    /// Text-only prompt.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: Vec::new(),
        }
    }

    /// Attach a media part.
    pub fn with_media(mut self, media: MediaPart) -> Self {
        self.media.push(media);
        self
    }

    /// Bind the prompt to one candidate.
    pub fn to_request(&self, model: &str) -> ModelRequest {
        ModelRequest {
            model: model.to_owned(),
            prompt: self.clone(),
        }
    }
}

/// One outbound call to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Backend model identifier.
    pub model: String,
    /// Prompt and attachments.
    pub prompt: Prompt,
}

/// Trait for language-model backends.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Returns the backend name (e.g. `"http"`).
    fn name(&self) -> &str;

    /// Perform one call and return the response text.
    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError>;
}
