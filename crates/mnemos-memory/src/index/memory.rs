//! Process-local vector backend.

use super::{
    CollectionInfo, DistanceMetric, SearchHit, VectorBackend, approx_cosine,
    validate_collection_name,
};
use crate::error::MemoryError;
use crate::model::{MemoryPoint, PointPayload};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct Collection {
    info: CollectionInfo,
    points: BTreeMap<u64, (Vec<f32>, PointPayload)>,
}

/// Vector backend holding everything in memory; ranks by cosine like the
/// SQLite backend.
#[derive(Debug, Default)]
pub struct InMemoryVectorBackend {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorBackend for InMemoryVectorBackend {
    fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, MemoryError> {
        Ok(self
            .collections
            .read()
            .get(name)
            .map(|collection| collection.info.clone()))
    }

    fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), MemoryError> {
        validate_collection_name(name)?;
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(MemoryError::IndexUnavailable(format!(
                "collection already exists: {name}"
            )));
        }
        collections.insert(
            name.to_string(),
            Collection {
                info: CollectionInfo {
                    name: name.to_string(),
                    dimension,
                    metric,
                },
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn upsert(&self, collection: &str, point: &MemoryPoint) -> Result<(), MemoryError> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        target
            .points
            .insert(point.id, (point.vector.clone(), point.payload.clone()));
        Ok(())
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        let mut hits: Vec<SearchHit> = target
            .points
            .iter()
            .map(|(id, (stored, payload))| SearchHit {
                id: *id,
                approx_score: approx_cosine(vector, stored),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.approx_score
                .partial_cmp(&a.approx_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    fn get_vector(&self, collection: &str, id: u64) -> Result<Vec<f32>, MemoryError> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        target
            .points
            .get(&id)
            .map(|(vector, _)| vector.clone())
            .ok_or(MemoryError::PointNotFound(id))
    }

    fn count(&self, collection: &str) -> Result<usize, MemoryError> {
        let collections = self.collections.read();
        collections
            .get(collection)
            .map(|target| target.points.len())
            .ok_or_else(|| missing_collection(collection))
    }
}

fn missing_collection(name: &str) -> MemoryError {
    MemoryError::IndexUnavailable(format!("collection not found: {name}"))
}
