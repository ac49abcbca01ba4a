//! Prompt assembly from the recent transcript window and retrieval hits.

use crate::model::{RetrievedItem, Role, Turn};
use serde::Serialize;
use std::fmt;

/// Default system instruction block.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to the recent \
conversation and to retrieved messages from earlier conversations.\n\n\
Older messages may have been moved to long-term storage. When asked about earlier questions or \
conversations, consult the retrieved messages first. If the answer is not there, infer from the \
recent conversation, and say so plainly when you do not have the information.\n\n\
Cite retrieved messages by their number in square brackets, e.g. [1], [2]. If none apply, \
answer normally.";

/// Marks where the assistant reply begins.
pub const GENERATION_CUE: &str = "Assistant:";

/// Context window assumed for models missing from the table.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4000;

const MODEL_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    ("mistral", 8192),
    ("mistral:7b", 8192),
    ("mistral:8x7b", 32768),
    ("llama2", 4096),
    ("llama3", 8192),
    ("gemma", 8192),
    ("qwen", 32768),
];

/// Fully assembled input for the generation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptContext {
    /// System instruction block.
    pub system: String,
    /// Retrieval hits, cited as `[1]..[k]` in this order.
    pub retrieved: Vec<RetrievedItem>,
    /// Recent transcript turns, oldest first.
    pub recent: Vec<Turn>,
    /// The new user message.
    pub user_input: String,
}

impl PromptContext {
    /// Render the prompt text: system block, numbered retrieval hits,
    /// recent turns, new input, generation cue.
    pub fn render(&self) -> String {
        let mut parts = vec![self.system.clone()];
        if !self.retrieved.is_empty() {
            let citations: Vec<String> = self
                .retrieved
                .iter()
                .enumerate()
                .map(|(idx, item)| {
                    format!("[{}] {}  (Source: {})", idx + 1, item.text, item.source_label)
                })
                .collect();
            parts.push(format!(
                "\nRelevant retrieved messages (with source IDs):\n{}",
                citations.join("\n")
            ));
        }
        for turn in &self.recent {
            parts.push(format!("{}: {}", turn.role.label(), turn.content));
        }
        parts.push(format!("{}: {}", Role::User.label(), self.user_input));
        parts.push(GENERATION_CUE.to_string());
        parts.join("\n")
    }
}

impl fmt::Display for PromptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Combines the recent window and retrieval hits into a `PromptContext`.
///
/// No token-budget truncation happens here.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    system_prompt: String,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the system instruction block.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn assemble(
        &self,
        recent: &[Turn],
        retrieved: &[RetrievedItem],
        user_input: &str,
    ) -> PromptContext {
        PromptContext {
            system: self.system_prompt.clone(),
            retrieved: retrieved.to_vec(),
            recent: recent.to_vec(),
            user_input: user_input.to_string(),
        }
    }
}

/// Known context window for a model name, by longest matching prefix.
pub fn context_window_for(model: &str) -> usize {
    let model = model.to_lowercase();
    MODEL_CONTEXT_WINDOWS
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, window)| *window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}
