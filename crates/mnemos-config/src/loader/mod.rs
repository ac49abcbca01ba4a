//! Layered configuration loader.
//!
//! Discovers layers (system, user, project, cwd, runtime), validates each
//! against the schema, merges them, and produces the effective
//! `MnemosConfig`.

mod layer_io;
mod merge;
mod schema;
mod utils;

#[cfg(test)]
mod tests;

use crate::{ConfigError, MnemosConfig};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Config filename in local layers.
const DEFAULT_CONFIG_FILE: &str = "mnemos.json5";
/// Config directory under the home directory.
const DEFAULT_CONFIG_DIR: &str = ".mnemos";
/// Entries that mark a project root.
const DEFAULT_PROJECT_ROOT_MARKERS: &[&str] = &[".git"];
/// System config path on Unix.
const SYSTEM_CONFIG_PATH: &str = "/etc/mnemos/mnemos.json5";

/// Effective config plus the layers it was merged from.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: MnemosConfig,
    /// Layers that were found and merged, lowest precedence first.
    pub layers: Vec<ConfigLayer>,
}

/// Where a layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    System,
    User,
    Project,
    Cwd,
    /// Explicit paths, applied last.
    Runtime,
}

impl ConfigLayerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Project => "project",
            Self::Cwd => "cwd",
            Self::Runtime => "runtime",
        }
    }
}

/// A layer that was merged into the effective config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Layer locations used by `MnemosConfig::load_layered_with_options`.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    /// Working directory; anchors the project and cwd layers.
    pub cwd: PathBuf,
    /// Defaults to `/etc/mnemos/mnemos.json5` on Unix.
    pub system_config_path: Option<PathBuf>,
    /// Defaults to `~/.mnemos/mnemos.json5`.
    pub user_config_path: Option<PathBuf>,
    /// Must exist when listed.
    pub runtime_paths: Vec<PathBuf>,
    pub project_root_markers: Vec<String>,
}

impl LayeredConfigOptions {
    /// Default layer locations for `cwd`.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            system_config_path: layer_io::default_system_config_path(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
            project_root_markers: DEFAULT_PROJECT_ROOT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    /// Add a runtime layer, applied after every discovered layer.
    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl MnemosConfig {
    /// Load a single config file (no layering).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        info!("loading config from path: {}", path.as_ref().display());
        let contents = fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Load a single config from JSON5 contents (no layering).
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value: Value = json5::from_str(contents)?;
        schema::validate_layer_schema(&value, "config")?;
        config_from_value(value)
    }

    /// Load the layered stack from the default locations.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Load the layered stack.
    ///
    /// Precedence, low to high: system, user, project root, cwd, runtime.
    /// A file reachable through two layers is merged once.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let cwd = utils::normalize_path(&options.cwd)?;
        let mut loaded = Vec::new();

        for (source, path) in [
            (ConfigLayerSource::System, options.system_config_path.as_deref()),
            (ConfigLayerSource::User, options.user_config_path.as_deref()),
        ] {
            if let Some(layer) = layer_io::load_optional_layer(source, path)? {
                loaded.push(layer);
            }
        }

        let mut local = Vec::new();
        match utils::find_project_root(&cwd, &options.project_root_markers) {
            Some(root) => {
                debug!("resolved project root: {}", root.display());
                local.push((ConfigLayerSource::Project, root.join(DEFAULT_CONFIG_FILE)));
            }
            None => debug!("project root not found; skipping project layer"),
        }
        local.push((ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE)));

        let mut seen = HashSet::new();
        for (source, path) in local {
            if !seen.insert(utils::unique_path(&path)) {
                debug!(
                    "skipping duplicate layer (source={:?}, path={})",
                    source,
                    path.display()
                );
                continue;
            }
            if let Some(layer) = layer_io::load_optional_layer(source, Some(&path))? {
                loaded.push(layer);
            }
        }

        for path in &options.runtime_paths {
            loaded.push(layer_io::load_required_layer(ConfigLayerSource::Runtime, path)?);
        }

        let mut merged = Value::Object(serde_json::Map::new());
        let mut layers = Vec::with_capacity(loaded.len());
        for layer in loaded {
            merge::merge_json_values(&mut merged, &layer.value);
            layers.push(layer.meta);
        }

        let config = config_from_value(merged)?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(schema::invalid_field("effective", "model", "must not be empty"));
        }
        if self.index.dimension == 0 {
            return Err(schema::invalid_field(
                "effective",
                "index.dimension",
                "must be positive",
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(schema::invalid_field(
                "effective",
                "retrieval.top_k",
                "must be positive",
            ));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(schema::invalid_field(
                "effective",
                "retrieval.min_score",
                "must be within [-1, 1]",
            ));
        }
        if self
            .index
            .collection
            .as_deref()
            .is_some_and(|name| name.is_empty())
        {
            return Err(ConfigError::Invalid(
                "index.collection must be omitted or non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A parsed layer with its origin.
#[derive(Debug, Clone)]
struct LoadedLayer {
    meta: ConfigLayer,
    value: Value,
}

fn config_from_value(value: Value) -> Result<MnemosConfig, ConfigError> {
    let config: MnemosConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
