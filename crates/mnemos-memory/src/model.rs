//! Records shared by the transcript ledger and the semantic index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin tag for turns produced by a live exchange.
pub const LIVE_ORIGIN: &str = "live";

/// Speaker of a recorded turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Column value used by the ledger.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Speaker label used in prompts and reconstructed pair text.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    /// Parse a stored column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One speaker utterance in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Shared identifier; both rows of an exchange carry the same id.
    pub id: u64,
    /// Speaker.
    pub role: Role,
    /// Utterance text.
    pub content: String,
    /// Input tokens for user turns, output tokens for assistant turns.
    pub token_count: Option<u64>,
    /// Provenance tag (`live` or an import tag).
    pub origin: String,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Build a turn stamped with the current time.
    pub fn new(
        id: u64,
        role: Role,
        content: impl Into<String>,
        token_count: Option<u64>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            token_count,
            origin: origin.into(),
            created_at: Utc::now(),
        }
    }
}

/// Shape of a stored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// A user question and the assistant answer embedded together.
    Pair,
    /// A lone utterance.
    Single,
}

impl PointKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PointKind::Pair => "pair",
            PointKind::Single => "single",
        }
    }
}

/// Payload stored next to a point's vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointPayload {
    Pair {
        user: String,
        assistant: String,
        origin: String,
    },
    Single {
        text: String,
        origin: String,
    },
}

impl PointPayload {
    pub fn kind(&self) -> PointKind {
        match self {
            PointPayload::Pair { .. } => PointKind::Pair,
            PointPayload::Single { .. } => PointKind::Single,
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            PointPayload::Pair { origin, .. } | PointPayload::Single { origin, .. } => origin,
        }
    }

    /// Text the point was embedded from, and the text retrieval hands back.
    pub fn text(&self) -> String {
        match self {
            PointPayload::Pair {
                user, assistant, ..
            } => pair_text(user, assistant),
            PointPayload::Single { text, .. } => text.clone(),
        }
    }
}

/// Join an exchange into the single string that gets embedded.
pub fn pair_text(user: &str, assistant: &str) -> String {
    format!("User: {user}\nAssistant: {assistant}")
}

/// One retrievable unit in the semantic index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPoint {
    /// Turn id the point was recorded under.
    pub id: u64,
    /// Embedding of `payload.text()`.
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A retrieval hit that survived exact rescoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    /// Point id in the index.
    pub id: u64,
    /// Reconstructed text.
    pub text: String,
    /// Citation label carrying the id and the recomputed score.
    pub source_label: String,
    /// Exact cosine similarity against the query.
    pub score: f64,
}
