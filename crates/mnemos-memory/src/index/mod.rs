//! Vector store keyed by turn id.
//!
//! `VectorBackend` is the storage seam; `SemanticIndex` binds one backend
//! to one collection and owns the create-or-fall-back startup policy.

mod memory;
mod sqlite;

pub use memory::InMemoryVectorBackend;
pub use sqlite::SqliteVectorBackend;

use crate::error::MemoryError;
use crate::model::{MemoryPoint, PointPayload};
use log::{debug, info, warn};
use std::sync::Arc;

/// Collection used when the configured one cannot be created.
pub const DEFAULT_COLLECTION: &str = "chat_default";
/// Longest collection name accepted by the backends.
pub const MAX_COLLECTION_NAME_LEN: usize = 64;

/// Distance metric a collection is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }
}

/// Stored shape of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

/// A search candidate, best first.
///
/// `approx_score` is whatever the backend ranks by and is not comparable
/// across backends; retrieval rescores from the stored vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: u64,
    pub approx_score: f32,
    pub payload: PointPayload,
}

/// Storage operations a vector store must provide.
pub trait VectorBackend: Send + Sync {
    /// Shape of an existing collection, `None` if absent.
    fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, MemoryError>;

    /// Create a collection. Fails if the name is invalid or taken.
    fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), MemoryError>;

    /// Insert or replace the point stored under `point.id`.
    fn upsert(&self, collection: &str, point: &MemoryPoint) -> Result<(), MemoryError>;

    /// Nearest neighbours of `vector`, best first, at most `top_k`.
    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, MemoryError>;

    /// Exact vector stored for `id`.
    fn get_vector(&self, collection: &str, id: u64) -> Result<Vec<f32>, MemoryError>;

    /// Number of points in a collection.
    fn count(&self, collection: &str) -> Result<usize, MemoryError>;
}

/// How a `SemanticIndex` should bind to its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Preferred collection name.
    pub collection: String,
    /// Name tried once if the preferred collection cannot be created.
    pub fallback_collection: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

impl IndexConfig {
    /// Config whose collection is derived from a model identifier.
    pub fn for_model(model: &str, dimension: usize) -> Self {
        Self {
            collection: collection_name_for(model),
            fallback_collection: DEFAULT_COLLECTION.to_string(),
            dimension,
            metric: DistanceMetric::Cosine,
        }
    }
}

/// A backend bound to one collection.
#[derive(Clone)]
pub struct SemanticIndex {
    backend: Arc<dyn VectorBackend>,
    collection: String,
    dimension: usize,
}

impl SemanticIndex {
    /// Ensure the configured collection exists and bind to it.
    ///
    /// An existing collection with the same shape is reused. If the
    /// preferred collection cannot be created (or exists with another
    /// shape), the fallback name is tried once; a second failure is
    /// returned to the caller and should abort startup.
    pub fn bind(backend: Arc<dyn VectorBackend>, config: &IndexConfig) -> Result<Self, MemoryError> {
        let bound = match ensure_collection(backend.as_ref(), &config.collection, config) {
            Ok(()) => config.collection.clone(),
            Err(err) => {
                warn!(
                    "collection unavailable, falling back (collection={}, fallback={}): {err}",
                    config.collection, config.fallback_collection
                );
                ensure_collection(backend.as_ref(), &config.fallback_collection, config)?;
                config.fallback_collection.clone()
            }
        };
        info!(
            "semantic index bound (collection={bound}, dimension={})",
            config.dimension
        );
        Ok(Self {
            backend,
            collection: bound,
            dimension: config.dimension,
        })
    }

    /// Name of the collection actually bound.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace a point.
    pub fn upsert(&self, point: &MemoryPoint) -> Result<(), MemoryError> {
        self.check_dimension(&point.vector)?;
        self.backend.upsert(&self.collection, point)?;
        debug!(
            "upserted point (collection={}, id={}, kind={})",
            self.collection,
            point.id,
            point.payload.kind().as_str()
        );
        Ok(())
    }

    /// Candidates ordered best first by the backend's own ranking.
    pub fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, MemoryError> {
        self.check_dimension(vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.backend.search(&self.collection, vector, top_k)
    }

    /// Exact stored vector for `id`.
    pub fn get_vector(&self, id: u64) -> Result<Vec<f32>, MemoryError> {
        self.backend.get_vector(&self.collection, id)
    }

    /// Number of stored points.
    pub fn len(&self) -> Result<usize, MemoryError> {
        self.backend.count(&self.collection)
    }

    pub fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len()? == 0)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), MemoryError> {
        if vector.len() != self.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn ensure_collection(
    backend: &dyn VectorBackend,
    name: &str,
    config: &IndexConfig,
) -> Result<(), MemoryError> {
    match backend.collection(name)? {
        Some(info) if info.dimension == config.dimension && info.metric == config.metric => {
            debug!("collection exists (collection={name})");
            Ok(())
        }
        Some(info) => Err(MemoryError::IndexUnavailable(format!(
            "collection {name} exists with dimension {} and metric {}",
            info.dimension,
            info.metric.as_str()
        ))),
        None => backend.create_collection(name, config.dimension, config.metric),
    }
}

/// Derive a collection name from a model identifier.
///
/// Lowercases, maps every character outside `[a-z0-9_]` to `_`, prefixes
/// `model_` when the result starts with a digit, prefixes `chat_`, and
/// truncates to 64 characters. An empty identifier maps to
/// [`DEFAULT_COLLECTION`].
pub fn collection_name_for(model: &str) -> String {
    let mut sanitized: String = model
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        return DEFAULT_COLLECTION.to_string();
    }
    if sanitized.starts_with(|ch: char| ch.is_ascii_digit()) {
        sanitized = format!("model_{sanitized}");
    }
    format!("chat_{sanitized}")
        .chars()
        .take(MAX_COLLECTION_NAME_LEN)
        .collect()
}

/// Backends accept only names `collection_name_for` could produce.
pub(crate) fn validate_collection_name(name: &str) -> Result<(), MemoryError> {
    if name.is_empty() || name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(MemoryError::IndexUnavailable(format!(
            "invalid collection name length: {}",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
    {
        return Err(MemoryError::IndexUnavailable(format!(
            "invalid collection name: {name}"
        )));
    }
    Ok(())
}

/// Single-precision cosine used by backends to rank candidates; never used
/// for thresholding.
pub(crate) fn approx_cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
