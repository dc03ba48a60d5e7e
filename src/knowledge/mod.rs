//! Knowledge document cache.
//!
//! Materializes long-lived reference text (such as the student rule book)
//! from a slow source. Lookup order:
//!
//! 1. fresh in-memory entry (younger than the TTL)
//! 2. precomputed durable record, if longer than the plausibility threshold
//! 3. slow extraction from the raw source, raced against a deadline
//!
//! Steps 2 and 3 run inside [`moka`]'s per-key initializer, so concurrent
//! callers for the same key share one in-flight derivation.

pub mod extractor;
pub mod fs_store;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use tracing::{debug, info, warn};

pub use extractor::{DocumentExtractor, ModelExtractor};
pub use fs_store::FsDocumentStore;
pub use store::{DocumentRecord, DocumentStore, MemoryDocumentStore};

use crate::config::KnowledgeConfig;

/// Errors produced while materializing a document.
///
/// `Clone` because one failed derivation is reported to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KnowledgeError {
    /// Derivation exceeded its deadline.
    #[error("extraction of {source_key} timed out after {}s", .deadline.as_secs())]
    ExtractionTimeout {
        /// Key being derived.
        source_key: String,
        /// Deadline that elapsed.
        deadline: Duration,
    },

    /// Derivation finished but produced no text.
    #[error("extraction of {0} produced no text")]
    EmptyExtraction(String),

    /// The extractor failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The extractor's model backend was overloaded.
    #[error("extraction backend overloaded: {0}")]
    Overloaded(String),

    /// The raw source could not be read.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The durable store failed.
    #[error("store error: {0}")]
    Store(String),
}

impl KnowledgeError {
    /// Short sentence suitable for speaking back to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ExtractionTimeout { .. } => {
                "I'm still reading that document. Please ask again in a minute."
            }
            Self::Overloaded(_) => {
                "The assistant service is busy right now. Please try again in a moment."
            }
            _ => "Sorry, I couldn't open that document right now.",
        }
    }
}

/// Cached reference text for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDocument {
    /// Document text (never empty).
    pub text: String,
    /// When the text was derived (from the durable record when adopted).
    pub extracted_at: DateTime<Utc>,
    /// Key the text belongs to.
    pub source_key: String,
}

/// Explicit, shareable document cache. Construct once per process.
pub struct KnowledgeCache {
    entries: Cache<String, Arc<CachedDocument>>,
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn DocumentExtractor>,
    max_entries: u64,
    min_plausible_len: usize,
    deadline: Duration,
}

impl std::fmt::Debug for KnowledgeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeCache")
            .field("entries", &self.entries.entry_count())
            .field("min_plausible_len", &self.min_plausible_len)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl KnowledgeCache {
    /// Create a cache from the `[knowledge]` config section.
    pub fn new(
        config: &KnowledgeConfig,
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Self {
        let max_entries = config.max_entries.max(1);
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(config.ttl())
                .build(),
            store,
            extractor,
            max_entries,
            min_plausible_len: config.min_plausible_len,
            deadline: config.extraction_deadline(),
        }
    }

    /// Replace the freshness window. Drops any cached entries.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entries = Cache::builder()
            .max_capacity(self.max_entries)
            .time_to_live(ttl)
            .build();
        self
    }

    /// Document text for `source_key` using the configured deadline.
    ///
    /// # Errors
    ///
    /// See [`KnowledgeError`]; a timeout is reported as
    /// [`KnowledgeError::ExtractionTimeout`].
    pub async fn get_document_text(
        &self,
        source_key: &str,
    ) -> Result<Arc<CachedDocument>, KnowledgeError> {
        self.get_document_text_with_deadline(source_key, self.deadline)
            .await
    }

    /// Document text for `source_key` with an explicit extraction deadline.
    ///
    /// When several callers race on a cold key, the deadline of the caller
    /// that started the derivation applies to all of them.
    ///
    /// # Errors
    ///
    /// See [`KnowledgeError`].
    pub async fn get_document_text_with_deadline(
        &self,
        source_key: &str,
        deadline: Duration,
    ) -> Result<Arc<CachedDocument>, KnowledgeError> {
        if let Some(doc) = self.entries.get(source_key).await {
            debug!(source_key, "knowledge cache hit");
            return Ok(doc);
        }

        self.entries
            .try_get_with(source_key.to_owned(), self.materialize(source_key, deadline))
            .await
            .map_err(|e| (*e).clone())
    }

    /// Drop the in-memory entry so the next call re-derives or re-adopts.
    pub async fn invalidate(&self, source_key: &str) {
        self.entries.invalidate(source_key).await;
    }

    async fn materialize(
        &self,
        source_key: &str,
        deadline: Duration,
    ) -> Result<Arc<CachedDocument>, KnowledgeError> {
        match self.store.read_record(source_key).await {
            Ok(Some(record)) if record.text.chars().count() > self.min_plausible_len => {
                info!(source_key, length = record.length, "adopting precomputed record");
                return Ok(Arc::new(CachedDocument {
                    text: record.text,
                    extracted_at: record.extracted_at,
                    source_key: source_key.to_owned(),
                }));
            }
            Ok(Some(record)) => {
                warn!(
                    source_key,
                    length = record.length,
                    min = self.min_plausible_len,
                    "precomputed record too short, re-extracting"
                );
            }
            Ok(None) => debug!(source_key, "no precomputed record"),
            Err(e) => warn!(source_key, error = %e, "precomputed record unreadable, re-extracting"),
        }

        info!(source_key, deadline_secs = deadline.as_secs(), "extracting document");
        let derive = async {
            let raw = self.store.read_source(source_key).await?;
            self.extractor.extract(source_key, raw).await
        };
        let text = match tokio::time::timeout(deadline, derive).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(source_key, "document extraction timed out");
                return Err(KnowledgeError::ExtractionTimeout {
                    source_key: source_key.to_owned(),
                    deadline,
                });
            }
        };

        if text.trim().is_empty() {
            return Err(KnowledgeError::EmptyExtraction(source_key.to_owned()));
        }

        let extracted_at = Utc::now();
        let record = DocumentRecord::new(text.clone(), extracted_at);
        if let Err(e) = self.store.write_record(source_key, &record).await {
            warn!(source_key, error = %e, "failed to persist extracted record");
        }

        Ok(Arc::new(CachedDocument {
            text,
            extracted_at,
            source_key: source_key.to_owned(),
        }))
    }
}
