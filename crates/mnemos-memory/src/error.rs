//! Error types for memory operations.

/// Errors returned by the stores, the sequencer, and the collaborators.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Ledger or checkpoint storage failed.
    #[error("persistence error: {0}")]
    Persistence(String),
    /// A checkpoint advance tried to move backwards.
    #[error("sequence regression: attempted {attempted}, checkpoint is {checkpoint}")]
    SequenceRegression { attempted: u64, checkpoint: u64 },
    /// Vector store failure.
    #[error("index unavailable: {0}")]
    IndexUnavailable(String),
    /// No point stored under the requested id.
    #[error("point not found: {0}")]
    PointNotFound(u64),
    /// A vector does not match the collection dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Embedding collaborator failed.
    #[error("embedding error: {0}")]
    Embedding(String),
    /// Generation collaborator failed.
    #[error("generation error: {0}")]
    Generation(String),
    /// Token-count collaborator failed.
    #[error("token count error: {0}")]
    TokenCount(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Wrap a ledger or checkpoint failure.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Wrap a vector store failure.
    pub fn index(err: impl std::fmt::Display) -> Self {
        Self::IndexUnavailable(err.to_string())
    }
}
