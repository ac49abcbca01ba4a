//! Tests for layered configuration loading.

use super::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Options with no system or user layer, so the host machine cannot leak in.
fn isolated_options(cwd: &Path) -> LayeredConfigOptions {
    let mut options = LayeredConfigOptions::new(cwd);
    options.system_config_path = None;
    options.user_config_path = None;
    options
}

#[test]
fn empty_config_uses_defaults() {
    let config = MnemosConfig::load_from_str("{}").expect("config");
    assert_eq!(config, MnemosConfig::default());
    assert_eq!(config.model, "mistral");
    assert_eq!(config.storage.db_path, "chat_memory.db");
    assert_eq!(config.index.dimension, 384);
    assert_eq!(config.index.fallback_collection, "chat_default");
    assert_eq!(config.retrieval.min_score, 0.65);
    assert_eq!(config.context.window_turns, 20);
}

#[test]
fn json5_syntax_is_accepted() {
    let contents = r#"{
        // comments and trailing commas
        model: "llama3",
        retrieval: { top_k: 8, min_score: 0.7, },
    }"#;
    let config = MnemosConfig::load_from_str(contents).expect("config");
    assert_eq!(config.model, "llama3");
    assert_eq!(config.retrieval.top_k, 8);
    assert_eq!(config.retrieval.min_score, 0.7);
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = MnemosConfig::load_from_str("{ unexpected: true }").unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

#[test]
fn rejects_unknown_nested_key() {
    let err = MnemosConfig::load_from_str("{ retrieval: { limit: 3 } }").unwrap_err();
    assert!(format!("{err}").contains("retrieval.limit"));
}

#[test]
fn rejects_wrong_field_type() {
    let err = MnemosConfig::load_from_str(r#"{ index: { dimension: "384" } }"#).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("index.dimension"));
    assert!(msg.contains("expected non-negative integer"));
}

#[test]
fn rejects_out_of_range_threshold() {
    let err = MnemosConfig::load_from_str("{ retrieval: { min_score: 1.5 } }").unwrap_err();
    assert!(format!("{err}").contains("retrieval.min_score"));
}

#[test]
fn rejects_zero_dimension_and_top_k() {
    assert!(MnemosConfig::load_from_str("{ index: { dimension: 0 } }").is_err());
    assert!(MnemosConfig::load_from_str("{ retrieval: { top_k: 0 } }").is_err());
}

#[test]
fn rejects_blank_model() {
    let err = MnemosConfig::load_from_str(r#"{ model: "  " }"#).unwrap_err();
    assert!(format!("{err}").contains("model"));
}

#[test]
fn nullable_fields_accept_null() {
    let config = MnemosConfig::load_from_str(
        "{ index: { collection: null }, context: { system_prompt: null, window_tokens: null } }",
    )
    .expect("config");
    assert_eq!(config.index.collection, None);
    assert_eq!(config.context.window_tokens, None);
}

#[test]
fn layers_merge_in_precedence_order() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    let system_config = root.join("system.json5");
    write_json5(
        &system_config,
        r#"{ model: "system-model", retrieval: { top_k: 2 }, ollama: { base_url: "http://sys:1" } }"#,
    );
    let user_config = root.join("user.json5");
    write_json5(&user_config, r#"{ model: "user-model", retrieval: { top_k: 3 } }"#);
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        r#"{ model: "project-model" }"#,
    );
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), r#"{ model: "cwd-model" }"#);

    let mut options = LayeredConfigOptions::new(&cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = Some(user_config);

    let layered = MnemosConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.model, "cwd-model");
    assert_eq!(layered.config.retrieval.top_k, 3);
    assert_eq!(layered.config.ollama.base_url, "http://sys:1");
    let sources: Vec<ConfigLayerSource> = layered.layers.iter().map(|l| l.source).collect();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::System,
            ConfigLayerSource::User,
            ConfigLayerSource::Project,
            ConfigLayerSource::Cwd,
        ]
    );
}

#[test]
fn runtime_layer_wins() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path().join("work");
    fs::create_dir_all(&cwd).expect("cwd");
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), "{ context: { window_turns: 10 } }");
    let runtime = temp.path().join("runtime.json5");
    write_json5(&runtime, "{ context: { window_turns: 4 } }");

    let options = isolated_options(&cwd).with_runtime_path(&runtime);
    let layered = MnemosConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.context.window_turns, 4);
    assert_eq!(layered.layers.last().map(|l| l.source), Some(ConfigLayerSource::Runtime));
}

#[test]
fn missing_runtime_layer_is_an_error() {
    let temp = TempDir::new().expect("tmp");
    let options = isolated_options(temp.path()).with_runtime_path(temp.path().join("absent.json5"));
    let err = MnemosConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed(_)));
}

#[test]
fn project_root_equal_to_cwd_is_loaded_once() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path().join("repo");
    fs::create_dir_all(cwd.join(".git")).expect("git");
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), r#"{ model: "gemma" }"#);

    let layered = MnemosConfig::load_layered_with_options(isolated_options(&cwd)).expect("layered");
    assert_eq!(layered.config.model, "gemma");
    assert_eq!(layered.layers.len(), 1);
    assert_eq!(layered.layers[0].source, ConfigLayerSource::Project);
}

#[test]
fn invalid_layer_names_its_source() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path().join("work");
    write_json5(&cwd.join(DEFAULT_CONFIG_FILE), "{ storage: { db_path: 7 } }");

    let err = MnemosConfig::load_layered_with_options(isolated_options(&cwd)).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("cwd("));
    assert!(msg.contains("storage.db_path"));
}
