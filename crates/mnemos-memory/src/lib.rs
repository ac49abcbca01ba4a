//! Two-tier conversation memory: a transcript ledger and a semantic index
//! sharing one id space.

pub mod assemble;
pub mod conversation;
pub mod error;
pub mod index;
pub mod ledger;
pub mod model;
pub mod provider;
pub mod recorder;
pub mod retrieval;
pub mod sequencer;
pub mod similarity;

/// Prompt assembly.
pub use assemble::{
    ContextAssembler, DEFAULT_CONTEXT_WINDOW, DEFAULT_SYSTEM_PROMPT, GENERATION_CUE,
    PromptContext, context_window_for,
};
/// Exchange driver.
pub use conversation::{
    Collaborators, ConversationMemory, ConversationSettings, DEFAULT_WINDOW_TURNS,
    ExchangeOutcome, MemoryStatus, RecordStatus,
};
/// Memory error type.
pub use error::MemoryError;
/// Vector backends and the bound index.
pub use index::{
    CollectionInfo, DEFAULT_COLLECTION, DistanceMetric, IndexConfig,
    InMemoryVectorBackend, MAX_COLLECTION_NAME_LEN, SearchHit, SemanticIndex,
    SqliteVectorBackend, VectorBackend, collection_name_for,
};
/// Transcript and checkpoint storage.
pub use ledger::{CHECKPOINT_KEY, CheckpointStore, SqliteLedger, TranscriptLedger};
/// Records and payloads.
pub use model::{
    LIVE_ORIGIN, MemoryPoint, PointKind, PointPayload, RetrievedItem, Role, Turn, pair_text,
};
/// External collaborator interfaces.
pub use provider::{
    Embedder, FallbackTokenCounter, Generator, TokenCounter, WhitespaceTokenCounter,
};
pub use recorder::TurnRecorder;
pub use retrieval::{DEFAULT_MIN_SCORE, DEFAULT_TOP_K, RetrievalEngine, ScoredCandidate};
pub use sequencer::IdentitySequencer;
pub use similarity::cosine_similarity;
