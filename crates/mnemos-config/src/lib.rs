//! Configuration model and layered config loading for mnemos.
//!
//! Layers are JSON5 files merged low to high precedence; every layer is
//! schema-checked before merging and the effective config is validated.

mod error;
mod loader;
mod model;

/// Error type returned by config loading and validation.
pub use error::ConfigError;
/// Layered config types and loader options.
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
/// Configuration schema models.
pub use model::*;
