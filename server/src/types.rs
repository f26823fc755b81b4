//! Shared chat types for the DougChat server.
//!
//! This module defines the rows of the `messages` table and the change events
//! relayed to realtime subscribers. Messages are immutable once stored: the
//! application only ever inserts them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Name of the table holding chat messages.
pub const MESSAGES_TABLE: &str = "messages";

/// Database schema the messages table lives in.
pub const PUBLIC_SCHEMA: &str = "public";

/// A stored chat message.
///
/// `id` and `created_at` are assigned by the store on insert; `created_at` is
/// the only ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier. Numeric ids are rendered as strings.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    /// Email of the sender, copied from the session at send time.
    pub email: String,

    /// Trimmed message text.
    pub message: String,

    /// Insertion timestamp assigned by the store.
    pub created_at: DateTime<Utc>,
}

/// A row to insert into the messages table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub message: String,
    pub email: String,
}

impl NewMessage {
    /// Creates a new row, trimming leading and trailing whitespace from the text.
    #[must_use]
    pub fn new(message: &str, email: impl Into<String>) -> Self {
        Self {
            message: message.trim().to_string(),
            email: email.into(),
        }
    }

    /// Returns true if the trimmed text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }
}

/// The kind of row change carried by a [`ChangeEvent`].
///
/// Messages are never updated or deleted, so inserts are the only changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
}

/// A row-change notification pushed to realtime subscribers.
///
/// `new` is kept as untyped JSON so that subscribers validate the row shape
/// themselves before rendering it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event: ChangeKind,
    pub schema: String,
    pub table: String,
    pub new: Value,
}

impl ChangeEvent {
    /// Builds the insert notification for a freshly stored message.
    #[must_use]
    pub fn insert(message: &Message) -> Self {
        Self {
            event: ChangeKind::Insert,
            schema: PUBLIC_SCHEMA.to_string(),
            table: MESSAGES_TABLE.to_string(),
            new: json!({
                "id": message.id,
                "email": message.email,
                "message": message.message,
                "created_at": message.created_at,
            }),
        }
    }

    /// Returns the id of the changed row, if present.
    #[must_use]
    pub fn row_id(&self) -> Option<&str> {
        self.new.get("id").and_then(Value::as_str)
    }
}

/// Accepts both string and integer primary keys.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}
