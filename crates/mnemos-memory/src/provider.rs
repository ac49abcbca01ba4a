//! Interfaces to the external collaborators: embedding, generation, and
//! token counting.
//!
//! All three are blocking calls. Implementations that talk to a remote
//! service are expected to do their own connection handling; this crate
//! never retries them.

use crate::assemble::PromptContext;
use crate::error::MemoryError;
use log::warn;
use std::sync::Arc;

/// Text to fixed-length vector mapping.
///
/// Must be deterministic for identical input within a process lifetime.
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;
}

/// Prompt to reply mapping.
pub trait Generator: Send + Sync {
    /// Produce the assistant reply for an assembled prompt.
    fn generate(&self, prompt: &PromptContext) -> Result<String, MemoryError>;
}

/// Text to token-count mapping, used only for bookkeeping.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in `text`.
    fn count_tokens(&self, text: &str) -> Result<u64, MemoryError>;
}

/// Approximates tokens as whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<u64, MemoryError> {
        Ok(whitespace_tokens(text))
    }
}

/// Token counter that never fails: errors from the primary counter fall
/// back to the whitespace approximation.
#[derive(Clone)]
pub struct FallbackTokenCounter {
    primary: Option<Arc<dyn TokenCounter>>,
}

impl FallbackTokenCounter {
    /// Wrap a primary counter.
    pub fn new(primary: Arc<dyn TokenCounter>) -> Self {
        Self {
            primary: Some(primary),
        }
    }

    /// Counter with no primary; always uses the approximation.
    pub fn whitespace_only() -> Self {
        Self { primary: None }
    }

    /// Count tokens, never failing.
    pub fn count(&self, text: &str) -> u64 {
        let Some(primary) = self.primary.as_ref() else {
            return whitespace_tokens(text);
        };
        match primary.count_tokens(text) {
            Ok(count) => count,
            Err(err) => {
                warn!("token counter failed, using whitespace approximation: {err}");
                whitespace_tokens(text)
            }
        }
    }
}

impl Default for FallbackTokenCounter {
    fn default() -> Self {
        Self::whitespace_only()
    }
}

impl TokenCounter for FallbackTokenCounter {
    fn count_tokens(&self, text: &str) -> Result<u64, MemoryError> {
        Ok(self.count(text))
    }
}

fn whitespace_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
