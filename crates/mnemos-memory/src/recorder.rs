//! The write path: id issuance plus the index, ledger, checkpoint sequence.

use crate::error::MemoryError;
use crate::index::SemanticIndex;
use crate::ledger::TranscriptLedger;
use crate::model::{MemoryPoint, PointPayload, Role, Turn, pair_text};
use crate::provider::Embedder;
use crate::sequencer::IdentitySequencer;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records exchanges into both stores under one shared id.
///
/// Writes are ordered index, ledger, checkpoint, with no rollback:
/// - index upsert fails: nothing else is written, the checkpoint stays;
/// - ledger append fails: the index holds an orphan point; if no row landed
///   the next write reissues the id and overwrites it;
/// - checkpoint advance fails: the ledger is ahead, which the sequencer
///   reconciles on the next read.
///
/// One lock covers id issuance through checkpoint advance.
pub struct TurnRecorder {
    sequencer: IdentitySequencer,
    index: SemanticIndex,
    ledger: Arc<dyn TranscriptLedger>,
    embedder: Arc<dyn Embedder>,
    write_lock: Mutex<()>,
}

impl TurnRecorder {
    pub fn new(
        sequencer: IdentitySequencer,
        index: SemanticIndex,
        ledger: Arc<dyn TranscriptLedger>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            sequencer,
            index,
            ledger,
            embedder,
            write_lock: Mutex::new(()),
        }
    }

    /// Record a user/assistant exchange as one pair point and two ledger
    /// rows. Returns the assigned id.
    pub fn record_exchange(
        &self,
        user_text: &str,
        assistant_text: &str,
        origin: &str,
        input_tokens: Option<u64>,
        output_tokens: Option<u64>,
    ) -> Result<u64, MemoryError> {
        let vector = self.embedder.embed(&pair_text(user_text, assistant_text))?;
        let payload = PointPayload::Pair {
            user: user_text.to_string(),
            assistant: assistant_text.to_string(),
            origin: origin.to_string(),
        };
        let turns = [
            (Role::User, user_text, input_tokens),
            (Role::Assistant, assistant_text, output_tokens),
        ];
        self.commit(vector, payload, &turns, origin)
    }

    /// Record a lone utterance as one single point and one ledger row.
    pub fn record_single(
        &self,
        text: &str,
        origin: &str,
        input_tokens: Option<u64>,
    ) -> Result<u64, MemoryError> {
        let vector = self.embedder.embed(text)?;
        let payload = PointPayload::Single {
            text: text.to_string(),
            origin: origin.to_string(),
        };
        self.commit(vector, payload, &[(Role::User, text, input_tokens)], origin)
    }

    /// Last committed id.
    pub fn checkpoint(&self) -> Result<u64, MemoryError> {
        self.sequencer.checkpoint()
    }

    fn commit(
        &self,
        vector: Vec<f32>,
        payload: PointPayload,
        turns: &[(Role, &str, Option<u64>)],
        origin: &str,
    ) -> Result<u64, MemoryError> {
        let _guard = self.write_lock.lock();
        let id = self.sequencer.next_id()?;
        let kind = payload.kind();

        self.index.upsert(&MemoryPoint {
            id,
            vector,
            payload,
        })?;

        for (role, content, tokens) in turns {
            self.ledger
                .append(&Turn::new(id, *role, *content, *tokens, origin))?;
        }
        debug!("ledger rows written (id={id}, rows={})", turns.len());

        self.sequencer.advance(id)?;
        info!(
            "recorded {} (id={id}, origin={origin})",
            kind.as_str()
        );
        Ok(id)
    }
}
