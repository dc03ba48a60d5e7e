//! Durable storage behind the knowledge cache.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::KnowledgeError;

/// Precomputed text for one source, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Extracted text.
    pub text: String,
    /// When the text was derived.
    pub extracted_at: DateTime<Utc>,
    /// Character count of `text` at write time.
    pub length: usize,
}

impl DocumentRecord {
    /// Build a record for freshly derived text.
    pub fn new(text: impl Into<String>, extracted_at: DateTime<Utc>) -> Self {
        let text = text.into();
        let length = text.chars().count();
        Self {
            text,
            extracted_at,
            length,
        }
    }
}

/// Durable record store plus raw-source access.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the precomputed record for `source_key`, if any.
    async fn read_record(&self, source_key: &str) -> Result<Option<DocumentRecord>, KnowledgeError>;

    /// Persist a record for `source_key`, replacing any previous one.
    async fn write_record(
        &self,
        source_key: &str,
        record: &DocumentRecord,
    ) -> Result<(), KnowledgeError>;

    /// Read the raw source bytes (e.g. the PDF) for `source_key`.
    async fn read_source(&self, source_key: &str) -> Result<Vec<u8>, KnowledgeError>;
}

/// In-process store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: Mutex<HashMap<String, DocumentRecord>>,
    sources: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register raw source bytes.
    pub fn put_source(&self, source_key: &str, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut sources) = self.sources.lock() {
            sources.insert(source_key.to_owned(), bytes.into());
        }
    }

    /// Register a precomputed record.
    pub fn put_record(&self, source_key: &str, record: DocumentRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(source_key.to_owned(), record);
        }
    }

    /// Snapshot of the stored record.
    pub fn record(&self, source_key: &str) -> Option<DocumentRecord> {
        self.records
            .lock()
            .ok()
            .and_then(|r| r.get(source_key).cloned())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read_record(&self, source_key: &str) -> Result<Option<DocumentRecord>, KnowledgeError> {
        let records = self
            .records
            .lock()
            .map_err(|_| KnowledgeError::Store("record map poisoned".into()))?;
        Ok(records.get(source_key).cloned())
    }

    async fn write_record(
        &self,
        source_key: &str,
        record: &DocumentRecord,
    ) -> Result<(), KnowledgeError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| KnowledgeError::Store("record map poisoned".into()))?;
        records.insert(source_key.to_owned(), record.clone());
        Ok(())
    }

    async fn read_source(&self, source_key: &str) -> Result<Vec<u8>, KnowledgeError> {
        let sources = self
            .sources
            .lock()
            .map_err(|_| KnowledgeError::Store("source map poisoned".into()))?;
        sources
            .get(source_key)
            .cloned()
            .ok_or_else(|| KnowledgeError::SourceUnavailable(format!("no source for {source_key}")))
    }
}
