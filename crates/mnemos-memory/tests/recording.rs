use mnemos_memory::{
    CHECKPOINT_KEY, CheckpointStore, IdentitySequencer, IndexConfig, MemoryError, Role, SemanticIndex,
    SqliteLedger, SqliteVectorBackend, TranscriptLedger, TurnRecorder,
};
use mnemos_test_utils::{FailingBackend, FailingEmbedder, KeywordEmbedder};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const KEYWORDS: [&str; 4] = ["capital", "france", "weather", "rust"];

struct Harness {
    ledger: Arc<SqliteLedger>,
    backend: Arc<FailingBackend>,
    index: SemanticIndex,
    recorder: TurnRecorder,
}

fn harness() -> Harness {
    let ledger = Arc::new(SqliteLedger::open_in_memory().expect("ledger"));
    let backend = Arc::new(FailingBackend::new());
    let index = SemanticIndex::bind(
        backend.clone(),
        &IndexConfig::for_model("mistral", KEYWORDS.len()),
    )
    .expect("bind");
    let recorder = TurnRecorder::new(
        IdentitySequencer::new(ledger.clone(), ledger.clone()),
        index.clone(),
        ledger.clone(),
        Arc::new(KeywordEmbedder::new(KEYWORDS)),
    );
    Harness {
        ledger,
        backend,
        index,
        recorder,
    }
}

fn sqlite_recorder(dir: &Path) -> (Arc<SqliteLedger>, TurnRecorder) {
    let ledger = Arc::new(SqliteLedger::open(dir.join("chat_memory.db")).expect("ledger"));
    let backend = Arc::new(SqliteVectorBackend::open(dir.join("memory_index.db")).expect("index"));
    let index = SemanticIndex::bind(backend, &IndexConfig::for_model("mistral", KEYWORDS.len()))
        .expect("bind");
    let recorder = TurnRecorder::new(
        IdentitySequencer::new(ledger.clone(), ledger.clone()),
        index,
        ledger.clone(),
        Arc::new(KeywordEmbedder::new(KEYWORDS)),
    );
    (ledger, recorder)
}

#[test]
fn ids_stay_strictly_increasing_across_interleaved_failures() {
    let h = harness();
    let mut issued = Vec::new();

    issued.push(h.recorder.record_exchange("q1", "a1", "live", None, None).expect("first"));
    h.backend.fail_upserts(true);
    assert!(h.recorder.record_exchange("q2", "a2", "live", None, None).is_err());
    assert!(h.recorder.record_single("lost", "import", None).is_err());
    h.backend.fail_upserts(false);
    issued.push(h.recorder.record_single("note", "import", None).expect("single"));
    issued.push(h.recorder.record_exchange("q3", "a3", "live", None, None).expect("third"));

    assert_eq!(issued, vec![1, 2, 3]);
    assert!(issued.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn failed_upsert_leaves_ledger_and_checkpoint_untouched() {
    let h = harness();
    h.recorder.record_exchange("q1", "a1", "live", None, None).expect("first");
    h.backend.fail_upserts(true);

    let err = h
        .recorder
        .record_exchange("q2", "a2", "live", Some(1), Some(1))
        .unwrap_err();
    assert!(matches!(err, MemoryError::IndexUnavailable(_)));
    assert_eq!(h.ledger.len().expect("len"), 2);
    assert_eq!(h.ledger.load_checkpoint().expect("checkpoint"), Some(1));
    assert_eq!(h.index.len().expect("points"), 1);
}

#[test]
fn embedding_failure_aborts_before_any_write() {
    let ledger = Arc::new(SqliteLedger::open_in_memory().expect("ledger"));
    let index = SemanticIndex::bind(
        Arc::new(FailingBackend::new()),
        &IndexConfig::for_model("mistral", 4),
    )
    .expect("bind");
    let recorder = TurnRecorder::new(
        IdentitySequencer::new(ledger.clone(), ledger.clone()),
        index.clone(),
        ledger.clone(),
        Arc::new(FailingEmbedder::new("offline")),
    );

    let err = recorder.record_exchange("q", "a", "live", None, None).unwrap_err();
    assert!(matches!(err, MemoryError::Embedding(_)));
    assert!(ledger.is_empty().expect("empty"));
    assert_eq!(ledger.load_checkpoint().expect("checkpoint"), None);
    assert!(index.is_empty().expect("empty"));
}

#[test]
fn pair_rows_share_an_id_with_user_first() {
    let h = harness();
    h.recorder
        .record_exchange("question", "answer", "live", Some(3), Some(5))
        .expect("record");

    let rows = h.ledger.tail(2).expect("tail");
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].id, rows[0].role), (1, Role::User));
    assert_eq!((rows[1].id, rows[1].role), (1, Role::Assistant));
    assert_eq!(rows[0].token_count, Some(3));
    assert_eq!(rows[1].token_count, Some(5));
    assert_eq!(h.ledger.max_id().expect("max"), Some(1));
}

#[test]
fn ledger_max_matches_last_issued_id() {
    let h = harness();
    for n in 0..4 {
        h.recorder
            .record_exchange(&format!("q{n}"), &format!("a{n}"), "live", None, None)
            .expect("record");
    }
    let last = h.recorder.record_single("tail", "import", None).expect("single");
    assert_eq!(h.ledger.max_id().expect("max"), Some(last));
    assert_eq!(h.recorder.checkpoint().expect("checkpoint"), last);
}

#[test]
fn sequence_resumes_after_restart() {
    let temp = TempDir::new().expect("tmp");
    {
        let (_, recorder) = sqlite_recorder(temp.path());
        recorder.record_exchange("q1", "a1", "live", None, None).expect("first");
        recorder.record_exchange("q2", "a2", "live", None, None).expect("second");
    }
    let (ledger, recorder) = sqlite_recorder(temp.path());
    let id = recorder.record_exchange("q3", "a3", "live", None, None).expect("third");
    assert_eq!(id, 3);
    assert_eq!(ledger.len().expect("len"), 6);
}

#[test]
fn lost_checkpoint_recovers_from_ledger_max() {
    let temp = TempDir::new().expect("tmp");
    {
        let (_, recorder) = sqlite_recorder(temp.path());
        for n in 0..3 {
            recorder
                .record_exchange(&format!("q{n}"), "a", "live", None, None)
                .expect("record");
        }
    }
    let conn = rusqlite::Connection::open(temp.path().join("chat_memory.db")).expect("open");
    let removed = conn
        .execute("DELETE FROM meta WHERE key = ?1", [CHECKPOINT_KEY])
        .expect("delete");
    assert_eq!(removed, 1);
    drop(conn);

    let (ledger, recorder) = sqlite_recorder(temp.path());
    assert_eq!(ledger.load_checkpoint().expect("checkpoint"), None);
    assert_eq!(recorder.checkpoint().expect("recovered"), 3);
    assert_eq!(
        recorder.record_single("after", "import", None).expect("record"),
        4
    );
}

#[test]
fn concurrent_writers_get_unique_ids() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let h = harness();
    let recorder = Arc::new(h.recorder);
    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let recorder = Arc::clone(&recorder);
            thread::spawn(move || {
                let mut ids = Vec::with_capacity(PER_THREAD);
                for n in 0..PER_THREAD {
                    let id = recorder
                        .record_exchange(&format!("q{worker}-{n}"), "a", "live", None, None)
                        .expect("record");
                    ids.push(id);
                }
                ids
            })
        })
        .collect();

    let mut all = Vec::new();
    for worker in workers {
        let ids = worker.join().expect("worker panicked");
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        all.extend(ids);
    }

    let total = (THREADS * PER_THREAD) as u64;
    let unique: BTreeSet<u64> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len());
    assert_eq!(unique, (1..=total).collect::<BTreeSet<u64>>());
    assert_eq!(h.ledger.max_id().expect("max"), Some(total));
    assert_eq!(h.ledger.len().expect("len"), 2 * THREADS * PER_THREAD);
    assert_eq!(h.index.len().expect("points"), THREADS * PER_THREAD);
}
