use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use dockline_realtime::Feed;
use dockline_store::Database;
use dockline_types::events::FeedEvent;
use dockline_types::models::{Message, Thread, ThreadKind};

use crate::error::CommsError;
use crate::run_blocking;

/// Multi-step write workflows over the store. The store offers no
/// multi-statement transactions, so a conversation is created as three
/// separate writes; a failure partway through is surfaced as a
/// `PartialWrite` and never rolled back. The read path tolerates the
/// resulting orphans: a thread without participants is invisible to
/// `list_threads_for_user`.
#[derive(Clone)]
pub struct Composer {
    db: Arc<Database>,
    feed: Feed,
}

impl Composer {
    pub fn new(db: Arc<Database>, feed: Feed) -> Self {
        Self { db, feed }
    }

    /// Create a thread, its participant set, and its first message as
    /// one logical operation.
    ///
    /// Validation failures write nothing. A failure on step one aborts
    /// the rest. Failures after the thread row exists surface as
    /// `PartialWrite` with the thread id.
    pub async fn create_conversation(
        &self,
        creator_id: Uuid,
        recipient_ids: &[Uuid],
        title: Option<String>,
        urgent: bool,
        first_message: &str,
    ) -> Result<Thread, CommsError> {
        let body = first_message.trim();
        if body.is_empty() {
            return Err(CommsError::Validation("message body is empty".into()));
        }

        // Dedupe recipients, drop empty ids and the creator themself.
        let mut recipients: Vec<Uuid> = Vec::new();
        for id in recipient_ids {
            if id.is_nil() || *id == creator_id || recipients.contains(id) {
                continue;
            }
            recipients.push(*id);
        }
        if recipients.is_empty() {
            return Err(CommsError::Validation("no recipients".into()));
        }

        // Direct iff exactly one recipient besides the creator.
        let kind = if recipients.len() == 1 {
            ThreadKind::Direct
        } else {
            ThreadKind::Broadcast
        };

        let mut participant_ids = recipients.clone();
        participant_ids.push(creator_id);

        let thread = Thread {
            id: Uuid::new_v4(),
            kind,
            title: title.filter(|t| !t.trim().is_empty()),
            urgent,
            creator_id,
            created_at: Utc::now(),
            participant_ids: participant_ids.clone(),
        };

        // Step 1: the thread row. Failure here aborts cleanly.
        let row = thread.clone();
        run_blocking(&self.db, move |db| db.insert_thread(&row)).await?;

        // Step 2: the membership edges. The thread row already exists;
        // until these land it is invisible to list_threads_for_user.
        let thread_id = thread.id;
        let members = participant_ids.clone();
        if let Err(e) =
            run_blocking(&self.db, move |db| db.insert_participants(thread_id, &members)).await
        {
            warn!("Thread {} created but participants failed: {}", thread_id, e);
            return Err(partial(e, "thread", thread_id, "participant insert"));
        }

        // Step 3: the first message, from the creator.
        let message = Message::new(thread.id, creator_id, body);
        let first = message.clone();
        if let Err(e) = run_blocking(&self.db, move |db| db.insert_message(&first)).await {
            warn!("Thread {} created but first message failed: {}", thread_id, e);
            return Err(partial(e, "thread", thread_id, "first message insert"));
        }

        info!(
            "Created {:?} thread {} with {} participants",
            thread.kind,
            thread.id,
            thread.participant_ids.len()
        );

        self.feed.publish(FeedEvent::thread_insert(thread.clone()));
        self.feed.publish(FeedEvent::message_insert(message));

        Ok(thread)
    }

    /// Append a message to an existing thread and announce it on the
    /// feed.
    pub async fn send_message(
        &self,
        thread_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<Message, CommsError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CommsError::Validation("message body is empty".into()));
        }

        let message = Message::new(thread_id, sender_id, body);
        let row = message.clone();
        run_blocking(&self.db, move |db| db.insert_message(&row)).await?;

        self.feed.publish(FeedEvent::message_insert(message.clone()));
        Ok(message)
    }

    /// Delete a conversation and everything under it. The store walks
    /// the rows in dependency order; if it stops partway nothing is
    /// restored, and the error says so.
    pub async fn delete_conversation(&self, thread_id: Uuid) -> Result<(), CommsError> {
        run_blocking(&self.db, move |db| db.delete_thread_cascade(thread_id)).await?;
        info!("Deleted thread {}", thread_id);
        Ok(())
    }
}

fn partial(source: CommsError, entity: &'static str, id: Uuid, step: &'static str) -> CommsError {
    match source {
        CommsError::Store(source) => CommsError::PartialWrite {
            entity,
            id,
            step,
            source,
        },
        other => other,
    }
}
