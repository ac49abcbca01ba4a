use mnemos_memory::{Embedder, MemoryError};

/// Deterministic embedder with one dimension per keyword.
///
/// Each component counts case-insensitive occurrences of its keyword, so
/// texts sharing keywords are similar and texts sharing none score 0.0.
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|keyword| keyword.into().to_lowercase())
                .collect(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.keywords.len()
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let text = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .map(|keyword| text.matches(keyword.as_str()).count() as f32)
            .collect())
    }
}

/// Embedder that always fails.
#[derive(Debug, Clone)]
pub struct FailingEmbedder {
    message: String,
}

impl FailingEmbedder {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Embedder for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        Err(MemoryError::Embedding(self.message.clone()))
    }
}
