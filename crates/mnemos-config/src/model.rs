//! Configuration schema for mnemos.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MnemosConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    /// Generation model; also names the vector collection.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

impl Default for MnemosConfig {
    fn default() -> Self {
        Self {
            schema: None,
            model: default_model(),
            storage: StorageConfig::default(),
            index: IndexSettings::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl MnemosConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> MnemosConfigBuilder {
        MnemosConfigBuilder::new()
    }
}

/// Builder for assembling a `MnemosConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct MnemosConfigBuilder {
    config: MnemosConfig,
}

impl MnemosConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    pub fn index(mut self, index: IndexSettings) -> Self {
        self.config.index = index;
        self
    }

    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    pub fn context(mut self, context: ContextConfig) -> Self {
        self.config.context = context;
        self
    }

    pub fn ollama(mut self, ollama: OllamaConfig) -> Self {
        self.config.ollama = ollama;
        self
    }

    pub fn build(self) -> MnemosConfig {
        self.config
    }
}

fn default_model() -> String {
    "mistral".to_string()
}

/// On-disk locations of the two stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Transcript ledger and checkpoint database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Vector index database.
    #[serde(default = "default_index_path")]
    pub index_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_path: default_index_path(),
        }
    }
}

impl StorageConfig {
    /// Ledger path, resolved against `base` when relative.
    pub fn db_path_in(&self, base: &Path) -> PathBuf {
        resolve(base, &self.db_path)
    }

    /// Index path, resolved against `base` when relative.
    pub fn index_path_in(&self, base: &Path) -> PathBuf {
        resolve(base, &self.index_path)
    }
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn default_db_path() -> String {
    "chat_memory.db".to_string()
}

fn default_index_path() -> String {
    "memory_index.db".to_string()
}

/// Vector collection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Embedding dimension fixed at collection creation.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Explicit collection name; derived from `model` when unset.
    #[serde(default)]
    pub collection: Option<String>,
    /// Collection bound when the preferred one cannot be created.
    #[serde(default = "default_fallback_collection")]
    pub fallback_collection: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            collection: None,
            fallback_collection: default_fallback_collection(),
        }
    }
}

fn default_dimension() -> usize {
    384
}

fn default_fallback_collection() -> String {
    "chat_default".to_string()
}

/// Semantic retrieval tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Inclusive exact-cosine threshold.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_min_score() -> f64 {
    0.65
}

/// Prompt assembly settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Ledger rows included verbatim.
    #[serde(default = "default_window_turns")]
    pub window_turns: usize,
    /// Replaces the built-in system block.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Overrides the model context-window table.
    #[serde(default)]
    pub window_tokens: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_turns: default_window_turns(),
            system_prompt: None,
            window_tokens: None,
        }
    }
}

fn default_window_turns() -> usize {
    20
}

/// Ollama endpoint used for embeddings and generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}
