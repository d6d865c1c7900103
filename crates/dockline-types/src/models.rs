use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

/// A thread is direct when it has exactly one recipient besides the
/// creator, broadcast otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadKind {
    Direct,
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
}

/// A conversation grouping messages among a fixed participant set.
/// Immutable after creation except for deletion.
///
/// `participant_ids` is an annotation filled in by
/// `list_threads_for_user`; realtime thread payloads arrive without it,
/// which is why a thread insert triggers a full list refresh instead of
/// incremental construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: Uuid,
    pub kind: ThreadKind,
    pub title: Option<String>,
    pub urgent: bool,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
}

/// Immutable once created; ordered by created_at ascending with
/// insertion order as the tiebreak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

/// Existence means the user has read the message. Never created for the
/// message's own sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadMark {
    pub message_id: Uuid,
    pub user_id: Uuid,
}

impl Message {
    pub fn new(thread_id: Uuid, sender_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id,
            sender_id,
            body: body.into(),
            kind: MessageKind::Text,
            created_at: Utc::now(),
        }
    }
}
