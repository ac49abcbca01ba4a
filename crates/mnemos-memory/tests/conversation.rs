use mnemos_memory::{
    Collaborators, ConversationMemory, ConversationSettings, Embedder, FallbackTokenCounter,
    Generator, IndexConfig, MemoryError, RecordStatus, RetrievalEngine, SemanticIndex,
    SqliteLedger, TranscriptLedger,
};
use mnemos_test_utils::{
    FailingBackend, FailingEmbedder, FailingGenerator, FixedGenerator, KeywordEmbedder,
    RecordingGenerator,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const KEYWORDS: [&str; 4] = ["capital", "france", "weather", "rust"];

fn keyword_embedder() -> Arc<dyn Embedder> {
    Arc::new(KeywordEmbedder::new(KEYWORDS))
}

fn bind(backend: Arc<FailingBackend>) -> SemanticIndex {
    SemanticIndex::bind(backend, &IndexConfig::for_model("mistral", KEYWORDS.len()))
        .expect("bind")
}

fn memory_with(
    backend: Arc<FailingBackend>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
) -> (ConversationMemory, Arc<SqliteLedger>) {
    let ledger = Arc::new(SqliteLedger::open_in_memory().expect("ledger"));
    let memory = ConversationMemory::new(
        ConversationSettings::for_model("mistral"),
        ledger.clone(),
        ledger.clone(),
        bind(backend),
        Collaborators {
            embedder,
            generator,
            tokens: FallbackTokenCounter::whitespace_only(),
        },
    );
    (memory, ledger)
}

#[test]
fn recorded_pair_is_retrieved_as_joined_text() {
    let (memory, _) = memory_with(
        Arc::new(FailingBackend::new()),
        keyword_embedder(),
        Arc::new(FixedGenerator::new("Paris.")),
    );
    let outcome = memory.exchange("What is the capital of France?");
    assert_eq!(outcome.record, RecordStatus::Saved { id: 1 });

    let items = memory.recall("capital city of france", 5, 0.65);
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0].text,
        "User: What is the capital of France?\nAssistant: Paris."
    );
    assert_eq!(items[0].id, 1);
    assert!(items[0].source_label.starts_with("memory id:1 (sim:"));
}

#[test]
fn unrelated_queries_fall_below_threshold() {
    let (memory, _) = memory_with(
        Arc::new(FailingBackend::new()),
        keyword_embedder(),
        Arc::new(FixedGenerator::new("Paris.")),
    );
    memory.exchange("What is the capital of France?");
    assert!(memory.recall("how is the weather", 5, 0.65).is_empty());
}

#[test]
fn retrieved_items_are_cited_in_the_prompt() {
    let generator = Arc::new(RecordingGenerator::new("Paris."));
    let (memory, _) = memory_with(
        Arc::new(FailingBackend::new()),
        keyword_embedder(),
        generator.clone(),
    );
    memory.exchange("What is the capital of France?");
    let outcome = memory.exchange("Remind me: capital of France?");

    assert_eq!(outcome.retrieved.len(), 1);
    let prompt = generator.last_prompt().expect("prompt");
    assert_eq!(prompt.retrieved, outcome.retrieved);
    assert_eq!(prompt.recent.len(), 2);
    let rendered = prompt.render();
    assert!(rendered.contains("[1] User: What is the capital of France?\nAssistant: Paris."));
    assert!(rendered.ends_with("User: Remind me: capital of France?\nAssistant:"));
}

#[test]
fn embedding_failure_yields_empty_retrieval() {
    let index = bind(Arc::new(FailingBackend::new()));
    let engine = RetrievalEngine::new(Arc::new(FailingEmbedder::new("model offline")), index);
    assert!(engine.retrieve("anything", 5, 0.0).is_empty());
}

#[test]
fn search_failure_yields_empty_retrieval() {
    let backend = Arc::new(FailingBackend::new());
    let (memory, _) = memory_with(
        backend.clone(),
        keyword_embedder(),
        Arc::new(FixedGenerator::new("Paris.")),
    );
    memory.exchange("capital of France?");
    backend.fail_searches(true);

    let outcome = memory.exchange("capital of France again?");
    assert!(outcome.retrieved.is_empty());
    assert!(outcome.record.is_saved());
}

#[test]
fn unreadable_candidate_is_dropped_alone() {
    let backend = Arc::new(FailingBackend::new());
    let (memory, _) = memory_with(
        backend.clone(),
        keyword_embedder(),
        Arc::new(FixedGenerator::new("noted")),
    );
    memory.ingest("rust and france", "import").expect("first");
    memory.ingest("france capital", "import").expect("second");
    backend.fail_vector_read(1);

    let items = memory.recall("france", 5, 0.0);
    let ids: Vec<u64> = items.iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![2]);
}

#[test]
fn failed_generation_still_saves_a_reply() {
    let (memory, ledger) = memory_with(
        Arc::new(FailingBackend::new()),
        keyword_embedder(),
        Arc::new(FailingGenerator::new("connection refused")),
    );
    let outcome = memory.exchange("hello there");

    assert!(outcome.reply.starts_with("Error: generation failed."));
    assert!(outcome.reply.contains("connection refused"));
    assert_eq!(outcome.record, RecordStatus::Saved { id: 1 });
    let rows = ledger.tail(2).expect("tail");
    assert_eq!(rows[1].content, outcome.reply);
}

#[test]
fn failed_recording_keeps_the_reply() {
    let backend = Arc::new(FailingBackend::new());
    let (memory, ledger) = memory_with(
        backend.clone(),
        keyword_embedder(),
        Arc::new(FixedGenerator::new("Paris.")),
    );
    backend.fail_upserts(true);

    let outcome = memory.exchange("capital of France?");
    assert_eq!(outcome.reply, "Paris.");
    match &outcome.record {
        RecordStatus::NotSaved { reason } => assert!(reason.contains("injected upsert")),
        other => panic!("expected NotSaved, got {other:?}"),
    }
    assert!(ledger.tail(10).expect("tail").is_empty());
    assert_eq!(memory.status().expect("status").checkpoint, 0);
}

#[test]
fn ingest_uses_single_points_and_origin_tags() {
    let (memory, ledger) = memory_with(
        Arc::new(FailingBackend::new()),
        keyword_embedder(),
        Arc::new(FixedGenerator::new("ok")),
    );
    let id = memory.ingest("the weather in France", "transcript-2024").expect("ingest");

    assert_eq!(id, 1);
    let rows = ledger.tail(5).expect("tail");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin, "transcript-2024");
    assert_eq!(rows[0].token_count, Some(4));
    let items = memory.recall("weather", 5, 0.1);
    assert_eq!(items[0].text, "the weather in France");
}

#[test]
fn collection_falls_back_when_preferred_is_rejected() {
    let backend = Arc::new(FailingBackend::new().reject_collection("chat_mistral"));
    let index = bind(backend);
    assert_eq!(index.collection(), "chat_default");
}

#[test]
fn binding_fails_when_fallback_is_rejected_too() {
    let backend = Arc::new(
        FailingBackend::new()
            .reject_collection("chat_mistral")
            .reject_collection("chat_default"),
    );
    let result = SemanticIndex::bind(backend, &IndexConfig::for_model("mistral", 4));
    assert!(matches!(result, Err(MemoryError::IndexUnavailable(_))));
}
