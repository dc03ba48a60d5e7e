//! Alert lookup for the `check-alerts` action.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One alert, notice or deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: None,
            due: None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("alert lookup failed: {0}")]
pub struct AlertError(pub String);

/// Source of the student's current alerts.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn fetch_alerts(&self, session_id: &str) -> Result<Vec<Alert>, AlertError>;
}

/// Source that never has alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlerts;

#[async_trait]
impl AlertSource for NoAlerts {
    async fn fetch_alerts(&self, _session_id: &str) -> Result<Vec<Alert>, AlertError> {
        Ok(Vec::new())
    }
}

/// Fixed list of alerts shared by every session, optionally loaded from JSON.
#[derive(Debug, Clone, Default)]
pub struct StaticAlerts {
    alerts: Vec<Alert>,
}

impl StaticAlerts {
    pub fn new(alerts: Vec<Alert>) -> Self {
        Self { alerts }
    }

    /// Load a JSON array of alerts.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError`] if the file is unreadable or malformed.
    pub fn from_file(path: &Path) -> Result<Self, AlertError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AlertError(format!("failed to read {}: {e}", path.display())))?;
        let alerts = serde_json::from_str(&content)
            .map_err(|e| AlertError(format!("failed to parse {}: {e}", path.display())))?;
        Ok(Self { alerts })
    }
}

#[async_trait]
impl AlertSource for StaticAlerts {
    async fn fetch_alerts(&self, _session_id: &str) -> Result<Vec<Alert>, AlertError> {
        Ok(self.alerts.clone())
    }
}

/// Spoken summary of a list of alerts.
pub(crate) fn summarize(alerts: &[Alert]) -> String {
    match alerts {
        [] => "You have no new alerts.".to_owned(),
        [only] => format!("You have one alert: {}.", only.title.trim_end_matches('.')),
        [first, rest @ ..] => format!(
            "You have {} alerts. The first is: {}.",
            rest.len() + 1,
            first.title.trim_end_matches('.')
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn summaries() {
        assert_eq!(summarize(&[]), "You have no new alerts.");
        assert_eq!(
            summarize(&[Alert::new("Fee payment due Friday.")]),
            "You have one alert: Fee payment due Friday."
        );
        assert_eq!(
            summarize(&[Alert::new("Lab record"), Alert::new("Quiz")]),
            "You have 2 alerts. The first is: Lab record."
        );
    }

    #[test]
    fn loads_alert_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.json");
        std::fs::write(
            &path,
            r#"[{"title":"Mid-sem exams","due":"2026-10-20T09:00:00Z"}]"#,
        )
        .unwrap();
        let source = StaticAlerts::from_file(&path).unwrap();
        assert_eq!(source.alerts.len(), 1);
        assert!(source.alerts[0].due.is_some());
    }
}
