//! SQLite-backed vector collections with brute-force nearest-neighbour
//! search.

use super::{
    CollectionInfo, DistanceMetric, SearchHit, VectorBackend, approx_cosine,
    validate_collection_name,
};
use crate::error::MemoryError;
use crate::ledger::to_sql_id;
use crate::model::{MemoryPoint, PointPayload};
use chrono::Utc;
use log::info;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    metric TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS points (
    collection TEXT NOT NULL,
    id INTEGER NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('pair', 'single')),
    payload TEXT NOT NULL,
    vector BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY(collection, id),
    FOREIGN KEY(collection) REFERENCES collections(name) ON DELETE CASCADE
);
";

/// Vector backend persisting points as little-endian f32 blobs.
///
/// Search scans the whole collection and ranks by single-precision cosine.
pub struct SqliteVectorBackend {
    conn: Mutex<Connection>,
}

impl SqliteVectorBackend {
    /// Open or create the vector database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(MemoryError::index)?;
        let backend = Self::from_connection(conn)?;
        info!("opened vector store (path={})", path.display());
        Ok(backend)
    }

    /// Backend on a private in-memory database.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory().map_err(MemoryError::index)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, MemoryError> {
        conn.pragma_update(None, "foreign_keys", 1)
            .map_err(MemoryError::index)?;
        conn.execute_batch(SCHEMA_SQL).map_err(MemoryError::index)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn require_collection(&self, conn: &Connection, name: &str) -> Result<usize, MemoryError> {
        let dimension: Option<i64> = conn
            .query_row(
                "SELECT dimension FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(MemoryError::index)?;
        let dimension = dimension.ok_or_else(|| {
            MemoryError::IndexUnavailable(format!("collection not found: {name}"))
        })?;
        usize::try_from(dimension).map_err(MemoryError::index)
    }
}

impl VectorBackend for SqliteVectorBackend {
    fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, MemoryError> {
        let row: Option<(i64, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT dimension, metric FROM collections WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(MemoryError::index)?;
        let Some((dimension, metric)) = row else {
            return Ok(None);
        };
        let metric = DistanceMetric::parse(&metric).ok_or_else(|| {
            MemoryError::IndexUnavailable(format!("unknown metric for {name}: {metric}"))
        })?;
        Ok(Some(CollectionInfo {
            name: name.to_string(),
            dimension: usize::try_from(dimension).map_err(MemoryError::index)?,
            metric,
        }))
    }

    fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), MemoryError> {
        validate_collection_name(name)?;
        let dimension = i64::try_from(dimension).map_err(MemoryError::index)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO collections (name, dimension, metric, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, dimension, metric.as_str(), Utc::now()],
            )
            .map_err(MemoryError::index)?;
        info!("created collection (collection={name}, dimension={dimension})");
        Ok(())
    }

    fn upsert(&self, collection: &str, point: &MemoryPoint) -> Result<(), MemoryError> {
        let payload = serde_json::to_string(&point.payload).map_err(MemoryError::index)?;
        let id = to_sql_id(point.id).map_err(MemoryError::index)?;
        let blob = encode_vector(&point.vector);
        let conn = self.conn.lock();
        self.require_collection(&conn, collection)?;
        conn.execute(
            "INSERT INTO points (collection, id, kind, payload, vector, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(collection, id) DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                vector = excluded.vector,
                updated_at = excluded.updated_at",
            params![
                collection,
                id,
                point.payload.kind().as_str(),
                payload,
                blob,
                Utc::now()
            ],
        )
        .map_err(MemoryError::index)?;
        Ok(())
    }

    fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let conn = self.conn.lock();
        let dimension = self.require_collection(&conn, collection)?;
        let mut stmt = conn
            .prepare("SELECT id, payload, vector FROM points WHERE collection = ?1")
            .map_err(MemoryError::index)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                let id: i64 = row.get(0)?;
                let payload: String = row.get(1)?;
                let blob: Vec<u8> = row.get(2)?;
                Ok((id, payload, blob))
            })
            .map_err(MemoryError::index)?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, payload, blob) = row.map_err(MemoryError::index)?;
            let stored = decode_vector(&blob, dimension)?;
            let payload: PointPayload =
                serde_json::from_str(&payload).map_err(MemoryError::index)?;
            hits.push(SearchHit {
                id: u64::try_from(id).map_err(MemoryError::index)?,
                approx_score: approx_cosine(vector, &stored),
                payload,
            });
        }
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
        let sql_id = to_sql_id(id).map_err(MemoryError::index)?;
        let conn = self.conn.lock();
        let dimension = self.require_collection(&conn, collection)?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT vector FROM points WHERE collection = ?1 AND id = ?2",
                params![collection, sql_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(MemoryError::index)?;
        let blob = blob.ok_or(MemoryError::PointNotFound(id))?;
        decode_vector(&blob, dimension)
    }

    fn count(&self, collection: &str) -> Result<usize, MemoryError> {
        let conn = self.conn.lock();
        self.require_collection(&conn, collection)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM points WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(MemoryError::index)?;
        usize::try_from(count).map_err(MemoryError::index)
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(blob: &[u8], dimension: usize) -> Result<Vec<f32>, MemoryError> {
    let expected = dimension * std::mem::size_of::<f32>();
    if blob.len() != expected {
        return Err(MemoryError::IndexUnavailable(format!(
            "invalid vector byte length: expected {expected}, got {}",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
