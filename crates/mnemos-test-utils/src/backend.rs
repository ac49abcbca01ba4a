use mnemos_memory::{
    CollectionInfo, DistanceMetric, InMemoryVectorBackend, MemoryError, MemoryPoint, SearchHit,
    VectorBackend,
};
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct Faults {
    rejected_collections: HashSet<String>,
    upserts: bool,
    searches: bool,
    vector_reads: HashSet<u64>,
}

/// In-memory backend with switchable failures.
#[derive(Debug, Default)]
pub struct FailingBackend {
    inner: InMemoryVectorBackend,
    faults: Mutex<Faults>,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to create the named collection.
    pub fn reject_collection(self, name: impl Into<String>) -> Self {
        self.faults.lock().rejected_collections.insert(name.into());
        self
    }

    pub fn fail_upserts(&self, enabled: bool) {
        self.faults.lock().upserts = enabled;
    }

    pub fn fail_searches(&self, enabled: bool) {
        self.faults.lock().searches = enabled;
    }

    /// Make `get_vector` fail for one point id.
    pub fn fail_vector_read(&self, id: u64) {
        self.faults.lock().vector_reads.insert(id);
    }
}

fn injected(what: &str) -> MemoryError {
    MemoryError::IndexUnavailable(format!("injected {what} failure"))
}

impl VectorBackend for FailingBackend {
    fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, MemoryError> {
        self.inner.collection(name)
    }

    fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), MemoryError> {
        if self.faults.lock().rejected_collections.contains(name) {
            return Err(injected("create_collection"));
        }
        self.inner.create_collection(name, dimension, metric)
    }

    fn upsert(&self, collection: &str, point: &MemoryPoint) -> Result<(), MemoryError> {
        if self.faults.lock().upserts {
            return Err(injected("upsert"));
        }
        self.inner.upsert(collection, point)
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        if self.faults.lock().searches {
            return Err(injected("search"));
        }
        self.inner.search(collection, vector, top_k)
    }

    fn get_vector(&self, collection: &str, id: u64) -> Result<Vec<f32>, MemoryError> {
        if self.faults.lock().vector_reads.contains(&id) {
            return Err(injected("get_vector"));
        }
        self.inner.get_vector(collection, id)
    }

    fn count(&self, collection: &str) -> Result<usize, MemoryError> {
        self.inner.count(collection)
    }
}
