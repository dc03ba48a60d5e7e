//! Configuration types for the command pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Language-model backend and fallback policy.
    pub model: ModelConfig,
    /// Knowledge document cache settings.
    pub knowledge: KnowledgeConfig,
    /// Conversation history settings.
    pub conversation: ConversationConfig,
    /// Intent resolution settings.
    pub intent: IntentConfig,
    /// Speech capture settings.
    pub capture: CaptureConfig,
    /// Action dispatch settings.
    pub dispatch: DispatchConfig,
}

/// One entry in the ordered model fallback list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateConfig {
    /// Backend model identifier (e.g. `"gemini-2.5-flash"`).
    pub name: String,
    /// Attempts allowed against this candidate before moving on.
    pub max_attempts: u32,
}

impl CandidateConfig {
    /// Create a candidate entry.
    pub fn new(name: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            name: name.into(),
            max_attempts,
        }
    }
}

/// Language-model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the generate-content API.
    pub base_url: String,
    /// API key. Falls back to the `CAMPUS_VOICE_API_KEY` environment variable when empty.
    pub api_key: String,
    /// Candidates in preference order.
    pub candidates: Vec<CandidateConfig>,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on a single backoff sleep in milliseconds.
    pub max_delay_ms: u64,
    /// Random jitter added to each backoff, as a fraction of the delay (0.0 disables).
    pub jitter_ratio: f64,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// HTTP statuses treated as transient (overload / rate limit).
    pub overload_statuses: Vec<u16>,
    /// Case-insensitive message fragments treated as transient.
    pub overload_patterns: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            api_key: String::new(),
            candidates: vec![
                CandidateConfig::new("gemini-2.5-flash", 3),
                CandidateConfig::new("gemini-2.0-flash", 2),
                CandidateConfig::new("gemini-1.5-flash", 1),
            ],
            base_delay_ms: 1000,
            max_delay_ms: 16_000,
            jitter_ratio: 0.0,
            request_timeout_secs: 60,
            overload_statuses: vec![429, 500, 502, 503, 504],
            overload_patterns: vec![
                "overloaded".to_owned(),
                "rate limit".to_owned(),
                "resource exhausted".to_owned(),
                "unavailable".to_owned(),
            ],
        }
    }
}

impl ModelConfig {
    /// API key from config, or the `CAMPUS_VOICE_API_KEY` environment variable.
    pub fn effective_api_key(&self) -> String {
        if !self.api_key.trim().is_empty() {
            return self.api_key.clone();
        }
        std::env::var("CAMPUS_VOICE_API_KEY").unwrap_or_default()
    }
}

/// Knowledge document cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Time a cached document stays fresh, in seconds.
    pub ttl_secs: u64,
    /// Precomputed records shorter than this are ignored and re-derived.
    pub min_plausible_len: usize,
    /// Deadline for a single slow derivation, in seconds.
    pub extraction_deadline_secs: u64,
    /// Maximum number of documents held in memory.
    pub max_entries: u64,
    /// Directory holding durable records and raw sources.
    pub store_dir: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            min_plausible_len: 200,
            extraction_deadline_secs: 50,
            max_entries: 32,
            store_dir: default_data_dir().join("knowledge"),
        }
    }
}

impl KnowledgeConfig {
    /// TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Extraction deadline as a [`Duration`].
    pub fn extraction_deadline(&self) -> Duration {
        Duration::from_secs(self.extraction_deadline_secs)
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of turns kept per session.
    pub window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { window: 5 }
    }
}

/// Intent resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Overall budget for the model tier, across every attempt and
    /// candidate, before falling through to the keyword scan.
    pub model_deadline_secs: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            model_deadline_secs: 20,
        }
    }
}

impl IntentConfig {
    pub fn model_deadline(&self) -> Duration {
        Duration::from_secs(self.model_deadline_secs)
    }
}

/// Speech capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Trailing silence after a final fragment before the utterance is finalized.
    pub silence_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 1000,
        }
    }
}

/// Action dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deadline for asynchronous actions other than domain queries.
    pub action_timeout_secs: u64,
    /// Deadline for a domain question, including any document load.
    pub domain_query_timeout_secs: u64,
    /// Knowledge cache key of the student rule book document.
    pub rule_book_source_key: String,
    /// JSON resource index used for resource-id lookup.
    pub resource_index: Option<PathBuf>,
    /// JSON alert list served by check-alerts.
    pub alerts_file: Option<PathBuf>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            action_timeout_secs: 20,
            domain_query_timeout_secs: 75,
            rule_book_source_key: "srb.pdf".to_owned(),
            resource_index: None,
            alerts_file: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("campus-voice")
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/campus-voice/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("campus-voice")
            .join("config.toml")
    }
}
