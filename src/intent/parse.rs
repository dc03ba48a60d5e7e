//! Strict parsing of model output into a [`ResolvedIntent`].
//!
//! Model text is untrusted. It is reduced to the first balanced JSON object,
//! deserialized into a closed record, then validated against the action
//! vocabulary before anything downstream sees it.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{Action, ResolvedIntent};

/// Longest accepted intent label.
const MAX_LABEL_LEN: usize = 64;

/// Why model output was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentParseError {
    #[error("no JSON object in model output")]
    NoJson,

    #[error("invalid intent JSON: {0}")]
    Json(String),

    #[error("intent label is empty or too long")]
    BadLabel,

    #[error("action {0:?} is not in the vocabulary")]
    UnknownAction(String),

    #[error("parameter {0:?} is not a string")]
    BadParameter(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawIntent {
    intent: String,
    action: String,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    response: Option<String>,
}

/// Parse and validate a model reply.
///
/// # Errors
///
/// Returns [`IntentParseError`] for anything that does not fit the schema.
pub fn parse_model_intent(text: &str) -> Result<ResolvedIntent, IntentParseError> {
    let cleaned = strip_markdown_fences(text);
    let json = extract_json_object(&cleaned).ok_or(IntentParseError::NoJson)?;
    let raw: RawIntent =
        serde_json::from_str(json).map_err(|e| IntentParseError::Json(e.to_string()))?;

    let label = raw.intent.trim();
    if label.is_empty() || label.chars().count() > MAX_LABEL_LEN {
        return Err(IntentParseError::BadLabel);
    }

    let action =
        Action::parse(&raw.action).ok_or_else(|| IntentParseError::UnknownAction(raw.action.clone()))?;

    let mut parameters = BTreeMap::new();
    for (key, value) in raw.parameters {
        match value {
            serde_json::Value::String(s) => {
                if !key.trim().is_empty() && !s.trim().is_empty() {
                    parameters.insert(key.trim().to_owned(), s.trim().to_owned());
                }
            }
            serde_json::Value::Null => {}
            _ => return Err(IntentParseError::BadParameter(key)),
        }
    }

    let spoken_response = raw
        .response
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "Okay.".to_owned());

    Ok(ResolvedIntent {
        intent_label: label.to_ascii_lowercase(),
        action,
        parameters,
        spoken_response,
    })
}

/// Remove a leading ```` ```json ```` fence and trailing ```` ``` ````.
fn strip_markdown_fences(text: &str) -> String {
    let mut s = text.to_owned();
    if let Some(start) = s.find("```") {
        let fence_end = s[start + 3..]
            .find('\n')
            .map_or(start + 3, |i| start + 3 + i + 1);
        s.replace_range(start..fence_end, "");
    }
    if let Some(end) = s.rfind("```") {
        s.replace_range(end..end + 3, "");
    }
    s
}

/// Outermost balanced `{...}`, respecting strings and escapes.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
