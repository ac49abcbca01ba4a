//! Exchange driver tying retrieval, assembly, generation, and recording
//! together.

use crate::assemble::{ContextAssembler, context_window_for};
use crate::error::MemoryError;
use crate::index::SemanticIndex;
use crate::ledger::{CheckpointStore, TranscriptLedger};
use crate::model::{LIVE_ORIGIN, RetrievedItem, Turn};
use crate::provider::{Embedder, FallbackTokenCounter, Generator};
use crate::recorder::TurnRecorder;
use crate::retrieval::{DEFAULT_MIN_SCORE, DEFAULT_TOP_K, RetrievalEngine};
use crate::sequencer::IdentitySequencer;
use log::{debug, error, warn};
use std::sync::Arc;

/// Default number of ledger rows included verbatim in each prompt.
pub const DEFAULT_WINDOW_TURNS: usize = 20;

/// Per-exchange tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSettings {
    /// Generation model name; drives the context window estimate.
    pub model: String,
    pub top_k: usize,
    /// Inclusive similarity threshold.
    pub min_score: f64,
    /// Ledger rows in the recent window.
    pub window_turns: usize,
    /// Token estimate past which a warning is logged.
    pub context_window: usize,
}

impl ConversationSettings {
    pub fn for_model(model: impl Into<String>) -> Self {
        let model = model.into();
        let context_window = context_window_for(&model);
        Self {
            model,
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            window_turns: DEFAULT_WINDOW_TURNS,
            context_window,
        }
    }
}

/// External collaborators used by an exchange.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub tokens: FallbackTokenCounter,
}

/// Whether an exchange was durably recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Saved { id: u64 },
    NotSaved { reason: String },
}

impl RecordStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Result of one exchange. The reply is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    pub reply: String,
    pub retrieved: Vec<RetrievedItem>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub record: RecordStatus,
}

/// Snapshot reported by `ConversationMemory::status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStatus {
    pub model: String,
    pub collection: String,
    pub checkpoint: u64,
    pub points: usize,
}

/// Conversation memory over a transcript ledger and a semantic index.
pub struct ConversationMemory {
    settings: ConversationSettings,
    ledger: Arc<dyn TranscriptLedger>,
    recorder: TurnRecorder,
    retrieval: RetrievalEngine,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    tokens: FallbackTokenCounter,
}

impl ConversationMemory {
    pub fn new(
        settings: ConversationSettings,
        ledger: Arc<dyn TranscriptLedger>,
        checkpoints: Arc<dyn CheckpointStore>,
        index: SemanticIndex,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            embedder,
            generator,
            tokens,
        } = collaborators;
        let sequencer = IdentitySequencer::new(checkpoints, ledger.clone());
        let recorder = TurnRecorder::new(sequencer, index.clone(), ledger.clone(), embedder.clone());
        Self {
            settings,
            ledger,
            recorder,
            retrieval: RetrievalEngine::new(embedder, index),
            assembler: ContextAssembler::default(),
            generator,
            tokens,
        }
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn settings(&self) -> &ConversationSettings {
        &self.settings
    }

    /// Run one exchange: window, retrieval, assembly, generation, recording.
    ///
    /// Generation and recording failures are reported in the outcome,
    /// never as an error.
    pub fn exchange(&self, message: &str) -> ExchangeOutcome {
        let recent = match self.ledger.tail(self.settings.window_turns) {
            Ok(turns) => turns,
            Err(err) => {
                warn!("recent window unavailable, continuing without it: {err}");
                Vec::new()
            }
        };
        let retrieved =
            self.retrieval
                .retrieve(message, self.settings.top_k, self.settings.min_score);
        let prompt = self.assembler.assemble(&recent, &retrieved, message);

        let input_tokens = self.tokens.count(message);
        let prompt_tokens = self.tokens.count(&prompt.render());
        if prompt_tokens > self.settings.context_window as u64 {
            warn!(
                "prompt exceeds context window (tokens={prompt_tokens}, window={}, model={})",
                self.settings.context_window, self.settings.model
            );
        }
        debug!(
            "prompt assembled (recent={}, retrieved={}, tokens={prompt_tokens})",
            recent.len(),
            retrieved.len()
        );

        let reply = match self.generator.generate(&prompt) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("generation failed: {err}");
                format!("Error: generation failed. {err}")
            }
        };
        let output_tokens = self.tokens.count(&reply);

        let record = match self.recorder.record_exchange(
            message,
            &reply,
            LIVE_ORIGIN,
            Some(input_tokens),
            Some(output_tokens),
        ) {
            Ok(id) => RecordStatus::Saved { id },
            Err(err) => {
                error!("exchange not saved: {err}");
                RecordStatus::NotSaved {
                    reason: err.to_string(),
                }
            }
        };

        ExchangeOutcome {
            reply,
            retrieved,
            input_tokens,
            output_tokens,
            record,
        }
    }

    /// Record a lone utterance, e.g. a line of an imported transcript.
    pub fn ingest(&self, text: &str, origin: &str) -> Result<u64, MemoryError> {
        let tokens = self.tokens.count(text);
        self.recorder.record_single(text, origin, Some(tokens))
    }

    /// Retrieval without generation or recording.
    pub fn recall(&self, query: &str, top_k: usize, min_score: f64) -> Vec<RetrievedItem> {
        self.retrieval.retrieve(query, top_k, min_score)
    }

    /// Most recent `n` ledger rows, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<Turn>, MemoryError> {
        self.ledger.tail(n)
    }

    pub fn status(&self) -> Result<MemoryStatus, MemoryError> {
        let index = self.retrieval.index();
        Ok(MemoryStatus {
            model: self.settings.model.clone(),
            collection: index.collection().to_string(),
            checkpoint: self.recorder.checkpoint()?,
            points: index.len()?,
        })
    }
}
