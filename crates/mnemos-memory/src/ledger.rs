//! Append-only transcript log and checkpoint metadata backed by SQLite.

use crate::error::MemoryError;
use crate::model::{Role, Turn};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Metadata key holding the last committed turn id.
pub const CHECKPOINT_KEY: &str = "last_idx";

/// Relational log of utterances, one row per speaker turn.
pub trait TranscriptLedger: Send + Sync {
    /// Insert a turn. Never updates or deletes.
    fn append(&self, turn: &Turn) -> Result<(), MemoryError>;

    /// At most `n` most recent turns, oldest first.
    fn tail(&self, n: usize) -> Result<Vec<Turn>, MemoryError>;

    /// Highest turn id present, if any.
    fn max_id(&self) -> Result<Option<u64>, MemoryError>;
}

/// Durable slot for the sequencer checkpoint.
pub trait CheckpointStore: Send + Sync {
    /// Stored checkpoint, or `None` when the key is missing.
    fn load_checkpoint(&self) -> Result<Option<u64>, MemoryError>;

    /// Overwrite the stored checkpoint.
    fn store_checkpoint(&self, id: u64) -> Result<(), MemoryError>;
}

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS memory (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id INTEGER NOT NULL,
    role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
    content TEXT NOT NULL,
    input_tokens INTEGER,
    output_tokens INTEGER,
    origin TEXT NOT NULL DEFAULT 'live',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memory_id ON memory(id);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

/// SQLite transcript ledger. The same database carries the `meta` table,
/// so one instance serves as both ledger and checkpoint store.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open or create the ledger database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(MemoryError::persistence)?;
        let ledger = Self::from_connection(conn)?;
        info!("opened transcript ledger (path={})", path.display());
        Ok(ledger)
    }

    /// Ledger backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory().map_err(MemoryError::persistence)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, MemoryError> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(MemoryError::persistence)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of rows in the log.
    pub fn len(&self) -> Result<usize, MemoryError> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM memory", [], |row| row.get(0))
            .map_err(MemoryError::persistence)?;
        usize::try_from(count).map_err(MemoryError::persistence)
    }

    pub fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len()? == 0)
    }
}

impl TranscriptLedger for SqliteLedger {
    fn append(&self, turn: &Turn) -> Result<(), MemoryError> {
        let id = to_sql_id(turn.id)?;
        let tokens = turn.token_count.map(to_sql_id).transpose()?;
        let (input_tokens, output_tokens) = match turn.role {
            Role::User => (tokens, None),
            Role::Assistant => (None, tokens),
        };
        self.conn
            .lock()
            .execute(
                "INSERT INTO memory (id, role, content, input_tokens, output_tokens, origin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    turn.role.as_str(),
                    turn.content,
                    input_tokens,
                    output_tokens,
                    turn.origin,
                    turn.created_at
                ],
            )
            .map_err(MemoryError::persistence)?;
        debug!(
            "appended turn (id={}, role={}, content_len={})",
            turn.id,
            turn.role,
            turn.content.len()
        );
        Ok(())
    }

    fn tail(&self, n: usize) -> Result<Vec<Turn>, MemoryError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, role, content, input_tokens, output_tokens, origin, created_at
                 FROM memory
                 ORDER BY id DESC, seq DESC
                 LIMIT ?1",
            )
            .map_err(MemoryError::persistence)?;
        let rows = stmt
            .query_map(params![limit], decode_turn_row)
            .map_err(MemoryError::persistence)?;
        let mut turns = Vec::new();
        for row in rows {
            turns.push(row.map_err(MemoryError::persistence)?);
        }
        // Scanned newest first; callers get chronological order.
        turns.reverse();
        Ok(turns)
    }

    fn max_id(&self) -> Result<Option<u64>, MemoryError> {
        let max: Option<i64> = self
            .conn
            .lock()
            .query_row("SELECT MAX(id) FROM memory", [], |row| row.get(0))
            .map_err(MemoryError::persistence)?;
        max.map(from_sql_id).transpose()
    }
}

impl CheckpointStore for SqliteLedger {
    fn load_checkpoint(&self) -> Result<Option<u64>, MemoryError> {
        let value: Option<Option<String>> = self
            .conn
            .lock()
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![CHECKPOINT_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(MemoryError::persistence)?;
        let Some(Some(value)) = value else {
            return Ok(None);
        };
        value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| MemoryError::Persistence(format!("invalid {CHECKPOINT_KEY}: {err}")))
    }

    fn store_checkpoint(&self, id: u64) -> Result<(), MemoryError> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![CHECKPOINT_KEY, id.to_string()],
            )
            .map_err(MemoryError::persistence)?;
        debug!("checkpoint stored (last_idx={id})");
        Ok(())
    }
}

fn decode_turn_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Turn> {
    let id: i64 = row.get(0)?;
    let role_raw: String = row.get(1)?;
    let role = Role::parse(&role_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(MemoryError::Persistence(format!("unknown role: {role_raw}"))),
        )
    })?;
    let input_tokens: Option<i64> = row.get(3)?;
    let output_tokens: Option<i64> = row.get(4)?;
    let token_count = match role {
        Role::User => input_tokens,
        Role::Assistant => output_tokens,
    };
    let created_at: DateTime<Utc> = row.get(6)?;
    Ok(Turn {
        id: u64::try_from(id).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, id))?,
        role,
        content: row.get(2)?,
        token_count: token_count.and_then(|count| u64::try_from(count).ok()),
        origin: row.get(5)?,
        created_at,
    })
}

pub(crate) fn to_sql_id(id: u64) -> Result<i64, MemoryError> {
    i64::try_from(id).map_err(|_| MemoryError::Persistence(format!("id out of range: {id}")))
}

fn from_sql_id(id: i64) -> Result<u64, MemoryError> {
    u64::try_from(id).map_err(|_| MemoryError::Persistence(format!("negative id in ledger: {id}")))
}
