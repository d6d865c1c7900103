//! Database row types — these map directly to SQLite rows. Distinct
//! from the dockline-types domain models to keep the DB layer
//! independent; conversion happens in the query layer.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use dockline_types::models::{Message, MessageKind, Thread, ThreadKind};

use crate::StoreError;

pub struct ThreadRow {
    pub id: String,
    pub kind: String,
    pub title: Option<String>,
    pub urgent: bool,
    pub creator_id: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub body: String,
    pub kind: String,
    pub created_at: String,
}

pub fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("{} '{}' is not a uuid", what, raw)))
}

/// SQLite timestamps are either RFC 3339 (written by us) or
/// "YYYY-MM-DD HH:MM:SS" (written by datetime('now') defaults).
pub fn parse_timestamp(raw: &str, what: &str) -> Result<DateTime<Utc>, StoreError> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|_| StoreError::Corrupt(format!("{} '{}' is not a timestamp", what, raw)))
}

impl ThreadRow {
    pub fn into_thread(self, participant_ids: Vec<Uuid>) -> Result<Thread, StoreError> {
        let kind = match self.kind.as_str() {
            "direct" => ThreadKind::Direct,
            "broadcast" => ThreadKind::Broadcast,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "thread kind '{}' on thread '{}'",
                    other, self.id
                )));
            }
        };

        Ok(Thread {
            id: parse_uuid(&self.id, "thread id")?,
            kind,
            title: self.title,
            urgent: self.urgent,
            creator_id: parse_uuid(&self.creator_id, "creator_id")?,
            created_at: parse_timestamp(&self.created_at, "thread created_at")?,
            participant_ids,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message, StoreError> {
        // Only 'text' exists today; anything else is a row we don't
        // know how to interpret.
        let kind = match self.kind.as_str() {
            "text" => MessageKind::Text,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "message kind '{}' on message '{}'",
                    other, self.id
                )));
            }
        };

        Ok(Message {
            id: parse_uuid(&self.id, "message id")?,
            thread_id: parse_uuid(&self.thread_id, "thread_id")?,
            sender_id: parse_uuid(&self.sender_id, "sender_id")?,
            body: self.body,
            kind,
            created_at: parse_timestamp(&self.created_at, "message created_at")?,
        })
    }
}
