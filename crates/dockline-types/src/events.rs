use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Thread};

/// Row-change kind on the realtime feed. The core only acts on INSERT;
/// anything else is skipped at the channel layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The inserted row, discriminated by source table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "table", content = "new", rename_all = "lowercase")]
pub enum TablePayload {
    Messages(Message),
    Threads(Thread),
}

/// One event on the realtime feed, shaped like the hosted backend's
/// change notifications: `{event, table, new}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    pub event: ChangeKind,
    #[serde(flatten)]
    pub payload: TablePayload,
}

impl FeedEvent {
    pub fn message_insert(message: Message) -> Self {
        Self {
            event: ChangeKind::Insert,
            payload: TablePayload::Messages(message),
        }
    }

    pub fn thread_insert(thread: Thread) -> Self {
        Self {
            event: ChangeKind::Insert,
            payload: TablePayload::Threads(thread),
        }
    }

    /// Thread the event belongs to, for either table.
    pub fn thread_id(&self) -> Uuid {
        match &self.payload {
            TablePayload::Messages(m) => m.thread_id,
            TablePayload::Threads(t) => t.id,
        }
    }
}
