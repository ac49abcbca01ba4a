//! Test helpers shared across mnemos crates.

pub mod backend;
pub mod embed;
pub mod generate;

pub use backend::FailingBackend;
pub use embed::{FailingEmbedder, KeywordEmbedder};
pub use generate::{FailingGenerator, FixedGenerator, RecordingGenerator};
