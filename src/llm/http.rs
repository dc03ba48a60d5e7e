//! Generate-content HTTP backend.
//!
//! Talks to a `POST {base_url}/models/{model}:generateContent` endpoint. The
//! prompt is sent as a text part; attachments are sent as base64
//! `inline_data` parts. Response text is the concatenation of
//! `candidates[0].content.parts[*].text`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use super::backend::{ModelBackend, ModelRequest};
use super::error::ModelError;
use crate::config::ModelConfig;

/// HTTP backend for generate-content style APIs.
pub struct HttpModelBackend {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModelBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpModelBackend {
    /// Create a backend.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build the backend from the `[model]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        Self::new(
            config.base_url.clone(),
            config.effective_api_key(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ModelError {
        ModelError::Http {
            status: status.as_u16(),
            message: extract_error_message(body),
        }
    }
}

/// Build the JSON request body for one call.
fn build_request_body(request: &ModelRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt.text })];
    for media in &request.prompt.media {
        parts.push(json!({
            "inline_data": {
                "mime_type": media.mime_type,
                "data": BASE64.encode(&media.data),
            }
        }));
    }
    json!({ "contents": [{ "role": "user", "parts": parts }] })
}

/// Extract an error message from an error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Pull the response text out of a successful body.
fn extract_text(body: &Value) -> Result<String, ModelError> {
    let parts = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::EmptyResponse("response has no candidate parts".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse("response text is empty".into()));
    }
    Ok(text)
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        if self.api_key.is_empty() {
            return Err(ModelError::Config("no API key configured".into()));
        }

        let response = self
            .client
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Transport(format!("request to {} timed out", request.model))
                } else {
                    ModelError::Transport(format!("request to {} failed: {e}", request.model))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(format!("invalid JSON body: {e}")))?;
        extract_text(&body)
    }
}
