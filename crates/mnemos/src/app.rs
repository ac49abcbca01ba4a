//! Builds a `ConversationMemory` from the effective config.

use anyhow::Context;
use log::{info, warn};
use mnemos_config::MnemosConfig;
use mnemos_memory::{
    Collaborators, ContextAssembler, ConversationMemory, ConversationSettings, DistanceMetric,
    IndexConfig, MemoryError, SemanticIndex, SqliteLedger, SqliteVectorBackend,
    collection_name_for, context_window_for,
};
use std::path::Path;
use std::sync::Arc;

/// Vector collection settings derived from the config.
pub fn index_config(config: &MnemosConfig) -> IndexConfig {
    IndexConfig {
        collection: config
            .index
            .collection
            .clone()
            .unwrap_or_else(|| collection_name_for(&config.model)),
        fallback_collection: config.index.fallback_collection.clone(),
        dimension: config.index.dimension,
        metric: DistanceMetric::Cosine,
    }
}

/// Context window in tokens: the configured override, else what the model
/// server reports, else the model-name table.
///
/// `reported` is only called when no override is configured.
pub fn context_window(
    config: &MnemosConfig,
    reported: impl FnOnce() -> Result<usize, MemoryError>,
) -> usize {
    if let Some(window) = config.context.window_tokens {
        return window;
    }
    match reported() {
        Ok(window) => {
            info!(
                "using reported context window (model={}, tokens={window})",
                config.model
            );
            window
        }
        Err(err) => {
            let window = context_window_for(&config.model);
            warn!(
                "context window lookup failed, using model table (model={}, tokens={window}): {err}",
                config.model
            );
            window
        }
    }
}

/// Exchange settings derived from the config.
pub fn conversation_settings(
    config: &MnemosConfig,
    context_window: usize,
) -> ConversationSettings {
    let mut settings = ConversationSettings::for_model(config.model.clone());
    settings.top_k = config.retrieval.top_k;
    settings.min_score = config.retrieval.min_score;
    settings.window_turns = config.context.window_turns;
    settings.context_window = context_window;
    settings
}

/// Open both stores under `base_dir`, bind the index, and wire the
/// collaborators.
pub fn open_memory(
    config: &MnemosConfig,
    base_dir: &Path,
    collaborators: Collaborators,
    context_window: usize,
) -> anyhow::Result<ConversationMemory> {
    let db_path = config.storage.db_path_in(base_dir);
    let index_path = config.storage.index_path_in(base_dir);

    let ledger = Arc::new(
        SqliteLedger::open(&db_path)
            .with_context(|| format!("failed to open ledger at {}", db_path.display()))?,
    );
    let backend = Arc::new(
        SqliteVectorBackend::open(&index_path)
            .with_context(|| format!("failed to open index at {}", index_path.display()))?,
    );
    let index = SemanticIndex::bind(backend, &index_config(config))
        .context("no usable vector collection")?;
    info!(
        "memory ready (model={}, collection={}, ledger={}, index={})",
        config.model,
        index.collection(),
        db_path.display(),
        index_path.display()
    );

    let mut assembler = ContextAssembler::new();
    if let Some(prompt) = &config.context.system_prompt {
        assembler = assembler.with_system_prompt(prompt.clone());
    }

    Ok(ConversationMemory::new(
        conversation_settings(config, context_window),
        ledger.clone(),
        ledger,
        index,
        collaborators,
    )
    .with_assembler(assembler))
}

#[cfg(test)]
mod tests {
    use super::{context_window, conversation_settings, index_config, open_memory};
    use mnemos_config::{ContextConfig, IndexSettings, MnemosConfig};
    use mnemos_memory::{Collaborators, FallbackTokenCounter, MemoryError, RecordStatus};
    use std::cell::Cell;
    use mnemos_test_utils::{FixedGenerator, KeywordEmbedder};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn collaborators() -> Collaborators {
        Collaborators {
            embedder: Arc::new(KeywordEmbedder::new(["alpha", "beta"])),
            generator: Arc::new(FixedGenerator::new("alpha reply")),
            tokens: FallbackTokenCounter::whitespace_only(),
        }
    }

    fn small_config() -> MnemosConfig {
        MnemosConfig::builder()
            .model("Mistral:7B")
            .index(IndexSettings {
                dimension: 2,
                ..IndexSettings::default()
            })
            .build()
    }

    #[test]
    fn collection_derives_from_model_unless_set() {
        let mut config = small_config();
        assert_eq!(index_config(&config).collection, "chat_mistral_7b");
        config.index.collection = Some("chat_custom".to_string());
        assert_eq!(index_config(&config).collection, "chat_custom");
    }

    #[test]
    fn reported_window_wins_over_model_table() {
        let config = small_config();
        assert_eq!(context_window(&config, || Ok(32768)), 32768);
    }

    #[test]
    fn failed_lookup_falls_back_to_model_table() {
        let config = small_config();
        let window = context_window(&config, || {
            Err(MemoryError::Generation("connection refused".to_string()))
        });
        assert_eq!(window, 8192);
        assert_eq!(conversation_settings(&config, window).context_window, 8192);
    }

    #[test]
    fn configured_window_skips_lookup() {
        let mut config = small_config();
        config.context = ContextConfig {
            window_tokens: Some(1024),
            ..ContextConfig::default()
        };
        let called = Cell::new(false);
        let window = context_window(&config, || {
            called.set(true);
            Ok(32768)
        });
        assert_eq!(window, 1024);
        assert!(!called.get());
    }

    #[test]
    fn stores_persist_across_reopen() {
        let temp = TempDir::new().expect("tmp");
        let config = small_config();
        {
            let memory = open_memory(&config, temp.path(), collaborators(), 8192).expect("open");
            let outcome = memory.exchange("alpha question");
            assert_eq!(outcome.record, RecordStatus::Saved { id: 1 });
        }
        assert!(temp.path().join("chat_memory.db").exists());
        assert!(temp.path().join("memory_index.db").exists());

        let memory = open_memory(&config, temp.path(), collaborators(), 8192).expect("reopen");
        let status = memory.status().expect("status");
        assert_eq!(status.collection, "chat_mistral_7b");
        assert_eq!(status.checkpoint, 1);
        let outcome = memory.exchange("alpha again");
        assert_eq!(outcome.retrieved.len(), 1);
        assert_eq!(outcome.record, RecordStatus::Saved { id: 2 });
    }
}
