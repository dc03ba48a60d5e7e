//! Study resource filters and the best-effort resource lookup.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ResolvedIntent, params};

/// Kind of study resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Previous-year question papers.
    Pyq,
    /// Lecture notes.
    Notes,
    /// Course syllabus.
    Syllabus,
}

impl ResourceKind {
    /// Parse a spoken or wire kind.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pyq" | "pyqs" | "papers" => Some(Self::Pyq),
            "note" | "notes" => Some(Self::Notes),
            "syllabus" => Some(Self::Syllabus),
            _ => None,
        }
    }

    /// Wire label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pyq => "pyq",
            Self::Notes => "notes",
            Self::Syllabus => "syllabus",
        }
    }

    /// Phrase used in spoken confirmations.
    #[must_use]
    pub fn spoken(self) -> &'static str {
        match self {
            Self::Pyq => "previous year papers",
            Self::Notes => "notes",
            Self::Syllabus => "the syllabus",
        }
    }
}

/// Filters for listing or finding study resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub kind: ResourceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,
}

impl ResourceQuery {
    /// Filters carried by an intent.
    ///
    /// The kind comes from the `type` parameter when present, otherwise from
    /// the intent label suffix (`download-notes`), defaulting to papers.
    #[must_use]
    pub fn from_intent(intent: &ResolvedIntent) -> Self {
        let kind = intent
            .param(params::RESOURCE_TYPE)
            .and_then(ResourceKind::parse)
            .or_else(|| {
                intent
                    .intent_label
                    .rsplit_once('-')
                    .and_then(|(_, suffix)| ResourceKind::parse(suffix))
            })
            .unwrap_or(ResourceKind::Pyq);
        Self {
            kind,
            subject: intent.param(params::SUBJECT).map(str::to_owned),
            semester: intent.param(params::SEMESTER).map(str::to_owned),
        }
    }

    /// Whether there is enough to look up one concrete resource.
    #[must_use]
    pub fn is_specific(&self) -> bool {
        self.subject.is_some() && self.semester.is_some()
    }
}

/// A resource lookup failure. Always swallowed by callers.
#[derive(Debug, Clone, thiserror::Error)]
#[error("resource lookup failed: {0}")]
pub struct DirectoryError(pub String);

/// Read-only lookup from filters to at most one resource id.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Find one resource matching `query`.
    async fn find_resource(&self, query: &ResourceQuery) -> Result<Option<String>, DirectoryError>;
}

/// Directory with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResourceDirectory;

#[async_trait]
impl ResourceDirectory for NoResourceDirectory {
    async fn find_resource(&self, _query: &ResourceQuery) -> Result<Option<String>, DirectoryError> {
        Ok(None)
    }
}

/// One indexed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub id: String,
    pub kind: ResourceKind,
    pub subject: String,
    pub semester: String,
}

/// In-memory index, optionally loaded from a JSON array of [`ResourceEntry`].
#[derive(Debug, Clone, Default)]
pub struct StaticResourceDirectory {
    entries: Vec<ResourceEntry>,
}

impl StaticResourceDirectory {
    #[must_use]
    pub fn new(entries: Vec<ResourceEntry>) -> Self {
        Self { entries }
    }

    /// Load an index file.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] if the file is unreadable or not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DirectoryError(format!("failed to read {}: {e}", path.display())))?;
        let entries = serde_json::from_str(&content)
            .map_err(|e| DirectoryError(format!("failed to parse {}: {e}", path.display())))?;
        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResourceDirectory for StaticResourceDirectory {
    async fn find_resource(&self, query: &ResourceQuery) -> Result<Option<String>, DirectoryError> {
        let (Some(subject), Some(semester)) = (&query.subject, &query.semester) else {
            return Ok(None);
        };
        Ok(self
            .entries
            .iter()
            .find(|e| {
                e.kind == query.kind
                    && e.semester.trim() == semester.trim()
                    && e.subject.eq_ignore_ascii_case(subject.trim())
            })
            .map(|e| e.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::intent::Action;

    fn ai_pyq() -> ResourceEntry {
        ResourceEntry {
            id: "pyq-ai-5-2025".into(),
            kind: ResourceKind::Pyq,
            subject: "Artificial Intelligence".into(),
            semester: "5".into(),
        }
    }

    #[test]
    fn kind_from_intent_label_and_override() {
        let intent = ResolvedIntent::new("download-notes", Action::DownloadResource, "");
        assert_eq!(ResourceQuery::from_intent(&intent).kind, ResourceKind::Notes);

        let intent = intent.with_param(params::RESOURCE_TYPE, "syllabus");
        assert_eq!(ResourceQuery::from_intent(&intent).kind, ResourceKind::Syllabus);

        let intent = ResolvedIntent::new("fetch", Action::DownloadResource, "");
        assert_eq!(ResourceQuery::from_intent(&intent).kind, ResourceKind::Pyq);
    }

    #[tokio::test]
    async fn static_directory_matches_case_insensitively() {
        let dir = StaticResourceDirectory::new(vec![ai_pyq()]);
        let query = ResourceQuery {
            kind: ResourceKind::Pyq,
            subject: Some("artificial intelligence".into()),
            semester: Some("5".into()),
        };
        assert_eq!(
            dir.find_resource(&query).await.unwrap().as_deref(),
            Some("pyq-ai-5-2025")
        );

        let other_sem = ResourceQuery {
            semester: Some("6".into()),
            ..query.clone()
        };
        assert!(dir.find_resource(&other_sem).await.unwrap().is_none());

        let vague = ResourceQuery {
            semester: None,
            ..query
        };
        assert!(dir.find_resource(&vague).await.unwrap().is_none());
    }

    #[test]
    fn loads_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resources.json");
        std::fs::write(&path, serde_json::to_string(&vec![ai_pyq()]).unwrap()).unwrap();
        let index = StaticResourceDirectory::from_file(&path).unwrap();
        assert_eq!(index.len(), 1);

        std::fs::write(&path, "not json").unwrap();
        assert!(StaticResourceDirectory::from_file(&path).is_err());
    }
}
