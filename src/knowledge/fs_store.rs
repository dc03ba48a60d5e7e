//! Filesystem-backed document store.
//!
//! Records live at `{root}/records/{source_key}.json`; raw sources at
//! `{root}/sources/{source_key}`. Record writes are atomic (temp file +
//! fsync + rename) so a crash never leaves a half-written record behind.
//!
//! # Examples
//!
//! ```no_run
//! use campus_voice::knowledge::FsDocumentStore;
//!
//! let store = FsDocumentStore::new("/tmp/campus-voice-knowledge").unwrap();
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::KnowledgeError;
use super::store::{DocumentRecord, DocumentStore};

/// Filesystem document store.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Create a store rooted at `root`, creating the directory layout.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeError::Store`] if the directories cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, KnowledgeError> {
        let root = root.into();
        for dir in [root.join("records"), root.join("sources")] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                KnowledgeError::Store(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(Self { root })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, source_key: &str) -> Result<PathBuf, KnowledgeError> {
        validate_key(source_key)?;
        Ok(self.root.join("records").join(format!("{source_key}.json")))
    }

    /// Path a raw source for `source_key` is read from.
    ///
    /// # Errors
    ///
    /// Returns [`KnowledgeError::Store`] for keys that would escape the root.
    pub fn source_path(&self, source_key: &str) -> Result<PathBuf, KnowledgeError> {
        validate_key(source_key)?;
        Ok(self.root.join("sources").join(source_key))
    }
}

/// Keys are single path components: no separators, no `..`.
fn validate_key(source_key: &str) -> Result<(), KnowledgeError> {
    let bad = source_key.is_empty()
        || source_key == "."
        || source_key.contains("..")
        || source_key.contains(['/', '\\']);
    if bad {
        return Err(KnowledgeError::Store(format!(
            "invalid source key {source_key:?}"
        )));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read_record(&self, source_key: &str) -> Result<Option<DocumentRecord>, KnowledgeError> {
        let path = self.record_path(source_key)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KnowledgeError::Store(format!(
                    "failed to read record {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content).map(Some).map_err(|e| {
            KnowledgeError::Store(format!("failed to parse record {}: {e}", path.display()))
        })
    }

    async fn write_record(
        &self,
        source_key: &str,
        record: &DocumentRecord,
    ) -> Result<(), KnowledgeError> {
        let path = self.record_path(source_key)?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| KnowledgeError::Store(format!("failed to serialize record: {e}")))?;

        let tmp_path = self.root.join("records").join(format!(".{source_key}.tmp"));
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| {
                KnowledgeError::Store(format!(
                    "failed to write temp file {}: {e}",
                    tmp_path.display()
                ))
            })?;

        if let Ok(file) = tokio::fs::File::open(&tmp_path).await {
            let _ = file.sync_all().await;
        }

        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            KnowledgeError::Store(format!(
                "failed to rename temp file to {}: {e}",
                path.display()
            ))
        })
    }

    async fn read_source(&self, source_key: &str) -> Result<Vec<u8>, KnowledgeError> {
        let path = self.source_path(source_key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            KnowledgeError::SourceUnavailable(format!("failed to read {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path()).unwrap();
        assert!(store.read_record("srb.pdf").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_round_trip_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path()).unwrap();
        let record = DocumentRecord::new("rule text", Utc::now());

        store.write_record("srb.pdf", &record).await.unwrap();
        let loaded = store.read_record("srb.pdf").await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("records"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn reads_raw_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path()).unwrap();
        std::fs::write(store.source_path("srb.pdf").unwrap(), b"%PDF-1.7").unwrap();
        assert_eq!(store.read_source("srb.pdf").await.unwrap(), b"%PDF-1.7");
        assert!(matches!(
            store.read_source("other.pdf").await,
            Err(KnowledgeError::SourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path()).unwrap();
        for key in ["../etc/passwd", "a/b", "", ".."] {
            assert!(matches!(
                store.read_record(key).await,
                Err(KnowledgeError::Store(_))
            ));
        }
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("records").join("x.json"), "{not json").unwrap();
        assert!(store.read_record("x").await.is_err());
    }
}
