use mnemos_memory::{Generator, MemoryError, PromptContext};
use parking_lot::Mutex;

/// Generator returning the same reply for every prompt.
#[derive(Debug, Clone)]
pub struct FixedGenerator {
    reply: String,
}

impl FixedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Generator for FixedGenerator {
    fn generate(&self, _prompt: &PromptContext) -> Result<String, MemoryError> {
        Ok(self.reply.clone())
    }
}

/// Generator that always fails with the given diagnostic.
#[derive(Debug, Clone)]
pub struct FailingGenerator {
    message: String,
}

impl FailingGenerator {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Generator for FailingGenerator {
    fn generate(&self, _prompt: &PromptContext) -> Result<String, MemoryError> {
        Err(MemoryError::Generation(self.message.clone()))
    }
}

/// Fixed-reply generator that keeps every prompt it was given.
#[derive(Debug, Default)]
pub struct RecordingGenerator {
    reply: String,
    prompts: Mutex<Vec<PromptContext>>,
}

impl RecordingGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<PromptContext> {
        self.prompts.lock().clone()
    }

    pub fn last_prompt(&self) -> Option<PromptContext> {
        self.prompts.lock().last().cloned()
    }
}

impl Generator for RecordingGenerator {
    fn generate(&self, prompt: &PromptContext) -> Result<String, MemoryError> {
        self.prompts.lock().push(prompt.clone());
        Ok(self.reply.clone())
    }
}
