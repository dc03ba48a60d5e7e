//! Slow derivation of text from a raw source.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::KnowledgeError;
use crate::llm::{MediaPart, ModelCandidate, ModelInvoker, Prompt};

const EXTRACTION_PROMPT: &str = "Extract the complete text of the attached document. \
Preserve headings, numbered rules and tables as plain text. \
Do not summarize and do not add commentary.";

/// Turns raw source bytes into reference text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Derive text from `raw`. May be slow; the cache applies the deadline.
    async fn extract(&self, source_key: &str, raw: Vec<u8>) -> Result<String, KnowledgeError>;
}

/// Extracts text by sending the document to the language model as an attachment.
///
/// Plain-text sources skip the model and are decoded directly.
pub struct ModelExtractor {
    invoker: ModelInvoker,
    candidates: Vec<ModelCandidate>,
}

impl ModelExtractor {
    /// Create an extractor using its own candidate list.
    pub fn new(invoker: ModelInvoker, candidates: Vec<ModelCandidate>) -> Self {
        Self {
            invoker,
            candidates,
        }
    }
}

/// MIME type inferred from the key's extension.
fn mime_for(source_key: &str) -> &'static str {
    let ext = source_key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl DocumentExtractor for ModelExtractor {
    async fn extract(&self, source_key: &str, raw: Vec<u8>) -> Result<String, KnowledgeError> {
        let mime = mime_for(source_key);
        if mime == "text/plain" {
            return String::from_utf8(raw)
                .map_err(|e| KnowledgeError::Extraction(format!("{source_key} is not UTF-8: {e}")));
        }

        info!(source_key, bytes = raw.len(), mime, "extracting document via model");
        let prompt = Prompt::text(EXTRACTION_PROMPT).with_media(MediaPart::new(mime, raw));
        // Dropping this future on deadline aborts the call; no external cancel is needed.
        let cancel = CancellationToken::new();
        self.invoker
            .invoke(&prompt, &self.candidates, &cancel)
            .await
            .map(|out| out.text)
            .map_err(|e| {
                if e.is_overloaded() {
                    KnowledgeError::Overloaded(e.to_string())
                } else {
                    KnowledgeError::Extraction(e.to_string())
                }
            })
    }
}
