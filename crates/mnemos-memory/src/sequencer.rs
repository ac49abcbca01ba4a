//! Turn-id issuance shared by the ledger and the semantic index.

use crate::error::MemoryError;
use crate::ledger::{CheckpointStore, TranscriptLedger};
use log::{debug, warn};
use std::sync::Arc;

/// Owns the monotonically increasing turn-id counter.
///
/// The sequencer never caches: every call reads the persisted checkpoint
/// so that a restarted process and a running one agree on the next id.
/// Callers that issue ids concurrently must hold one lock across
/// `next_id`, both store writes, and `advance`; `TurnRecorder` does.
#[derive(Clone)]
pub struct IdentitySequencer {
    store: Arc<dyn CheckpointStore>,
    ledger: Arc<dyn TranscriptLedger>,
}

impl IdentitySequencer {
    pub fn new(store: Arc<dyn CheckpointStore>, ledger: Arc<dyn TranscriptLedger>) -> Self {
        Self { store, ledger }
    }

    /// Last committed id.
    ///
    /// Falls back to the ledger's highest id when the checkpoint is
    /// missing, and prefers the ledger when it has run ahead of the
    /// checkpoint, so an id that already has ledger rows is never reissued.
    pub fn checkpoint(&self) -> Result<u64, MemoryError> {
        let (stored, ledger_max) = self.read_positions()?;
        match (stored, ledger_max) {
            (Some(stored), Some(max)) if max > stored => {
                warn!("ledger is ahead of checkpoint (last_idx={stored}, ledger_max={max})");
                Ok(max)
            }
            (Some(stored), _) => Ok(stored),
            (None, Some(max)) => {
                warn!("checkpoint missing, recovered from ledger (ledger_max={max})");
                Ok(max)
            }
            (None, None) => Ok(0),
        }
    }

    /// Id for the next write. Persists nothing.
    pub fn next_id(&self) -> Result<u64, MemoryError> {
        let checkpoint = self.checkpoint()?;
        checkpoint
            .checked_add(1)
            .ok_or_else(|| MemoryError::Persistence("turn id space exhausted".to_string()))
    }

    /// Persist `id` as the new checkpoint.
    ///
    /// The ledger rows for `id` are normally already written at this
    /// point, so a ledger max equal to `id` is expected and not reported.
    pub fn advance(&self, id: u64) -> Result<(), MemoryError> {
        let (stored, ledger_max) = self.read_positions()?;
        let checkpoint = stored.unwrap_or(0).max(ledger_max.unwrap_or(0));
        if id < checkpoint {
            return Err(MemoryError::SequenceRegression {
                attempted: id,
                checkpoint,
            });
        }
        self.store.store_checkpoint(id)?;
        debug!("checkpoint advanced (last_idx={id})");
        Ok(())
    }

    fn read_positions(&self) -> Result<(Option<u64>, Option<u64>), MemoryError> {
        Ok((self.store.load_checkpoint()?, self.ledger.max_id()?))
    }
}
