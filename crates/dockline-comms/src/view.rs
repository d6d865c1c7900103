use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};
use uuid::Uuid;

use dockline_realtime::VIEW_TOPIC;
use dockline_types::events::{FeedEvent, TablePayload};
use dockline_types::models::{Message, Thread};

use crate::client::{ClientInner, CommsClient};
use crate::error::CommsError;
use crate::run_blocking;

pub(crate) struct ViewInner {
    client: Arc<ClientInner>,
    threads: Mutex<Vec<Thread>>,
    messages: Mutex<Vec<Message>>,
    /// Cleared on unmount. Completions of calls that were in flight
    /// when the view unmounted check this before touching state.
    live: AtomicBool,
}

/// The Communications view: the thread list with per-thread unread
/// flags and the currently-open conversation. Holds the view-scoped
/// realtime channel from mount to unmount; it coexists with the
/// session's global channel and the two react to the same inserts
/// independently.
pub struct CommsView {
    inner: Arc<ViewInner>,
}

impl CommsView {
    /// Mount the view: load the thread list, reconcile per-thread
    /// unread flags from the store (live events alone would miss
    /// anything sent before now), and subscribe the view channel.
    pub async fn mount(client: &CommsClient) -> Result<Self, CommsError> {
        let user = client.user_id().ok_or(CommsError::NotLoggedIn)?;

        let inner = Arc::new(ViewInner {
            client: client.inner.clone(),
            threads: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            live: AtomicBool::new(true),
        });

        refresh_threads(&inner, user).await?;

        let weak = Arc::downgrade(&inner);
        client.inner.channels.subscribe(VIEW_TOPIC, move |event, user| {
            let weak = weak.clone();
            async move {
                on_view_insert(weak, event, user).await;
            }
        });

        Ok(Self { inner })
    }

    /// Synchronous teardown: the channel is gone before this returns.
    /// Store calls already in flight finish, but their completions see
    /// the cleared live flag and drop their results.
    pub fn unmount(&self) {
        self.inner.live.store(false, Ordering::Release);
        self.inner.client.channels.unsubscribe(VIEW_TOPIC);
        *self
            .inner
            .client
            .state
            .active_thread
            .write()
            .expect("active thread poisoned") = None;
        debug!("Communications view unmounted");
    }

    /// Open a conversation: load its messages, then mark the whole
    /// thread read. A message inserted between the load and the mark
    /// is silently marked read without being seen — observed behavior
    /// of the dashboard, kept as-is.
    ///
    /// On failure the active-thread pointer is put back where the
    /// messages pane still is, so the two never disagree.
    pub async fn open_thread(&self, thread_id: Uuid) -> Result<Vec<Message>, CommsError> {
        let user = self
            .inner
            .client
            .channels
            .current_user()
            .ok_or(CommsError::NotLoggedIn)?;

        // Point the active slot at the new conversation up front so
        // the channel handlers treat its events as on-screen; remember
        // the old one in case the open fails.
        let previous = {
            let mut active = self
                .inner
                .client
                .state
                .active_thread
                .write()
                .expect("active thread poisoned");
            std::mem::replace(&mut *active, Some(thread_id))
        };

        match self.load_and_mark(thread_id, user).await {
            Ok(loaded) => Ok(loaded),
            Err(e) => {
                let mut active = self
                    .inner
                    .client
                    .state
                    .active_thread
                    .write()
                    .expect("active thread poisoned");
                // A concurrent open may already own the slot.
                if *active == Some(thread_id) {
                    *active = previous;
                }
                Err(e)
            }
        }
    }

    async fn load_and_mark(
        &self,
        thread_id: Uuid,
        user: Uuid,
    ) -> Result<Vec<Message>, CommsError> {
        let loaded = run_blocking(&self.inner.client.db, move |db| db.list_messages(thread_id))
            .await?;

        // Only publish into view state if we are still mounted and
        // this conversation is still the open one.
        if !self.inner.live.load(Ordering::Acquire)
            || self.active_thread() != Some(thread_id)
        {
            return Ok(loaded);
        }

        run_blocking(&self.inner.client.db, move |db| {
            db.mark_thread_read(thread_id, user)
        })
        .await?;

        if !self.inner.live.load(Ordering::Acquire)
            || self.active_thread() != Some(thread_id)
        {
            return Ok(loaded);
        }
        *self.inner.messages.lock().expect("message list poisoned") = loaded.clone();

        let count = {
            let mut unread = self
                .inner
                .client
                .state
                .unread
                .lock()
                .expect("unread state poisoned");
            unread.clear(thread_id);
            unread.thread_count()
        };
        self.inner.client.badge.publish(count);

        Ok(loaded)
    }

    pub fn close_thread(&self) {
        *self
            .inner
            .client
            .state
            .active_thread
            .write()
            .expect("active thread poisoned") = None;
        self.inner.messages.lock().expect("message list poisoned").clear();
    }

    /// Send into the open conversation.
    pub async fn send(&self, body: &str) -> Result<Message, CommsError> {
        let user = self
            .inner
            .client
            .channels
            .current_user()
            .ok_or(CommsError::NotLoggedIn)?;
        let thread_id = self
            .active_thread()
            .ok_or_else(|| CommsError::Validation("no conversation open".into()))?;
        self.inner.client.composer.send_message(thread_id, user, body).await
    }

    /// Delete a conversation, then refresh local state. The feed only
    /// carries inserts, so deletions do not arrive as events.
    pub async fn delete_thread(&self, thread_id: Uuid) -> Result<(), CommsError> {
        let user = self
            .inner
            .client
            .channels
            .current_user()
            .ok_or(CommsError::NotLoggedIn)?;

        self.inner.client.composer.delete_conversation(thread_id).await?;

        if self.active_thread() == Some(thread_id) {
            self.close_thread();
        }
        {
            let mut unread = self
                .inner
                .client
                .state
                .unread
                .lock()
                .expect("unread state poisoned");
            unread.clear(thread_id);
            let count = unread.thread_count();
            self.inner.client.badge.publish(count);
        }
        if self.inner.live.load(Ordering::Acquire) {
            refresh_threads(&self.inner, user).await?;
        }
        Ok(())
    }

    pub fn active_thread(&self) -> Option<Uuid> {
        *self
            .inner
            .client
            .state
            .active_thread
            .read()
            .expect("active thread poisoned")
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.inner.threads.lock().expect("thread list poisoned").clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.messages.lock().expect("message list poisoned").clone()
    }

    pub fn is_unread(&self, thread_id: Uuid) -> bool {
        self.inner
            .client
            .state
            .unread
            .lock()
            .expect("unread state poisoned")
            .is_unread(thread_id)
    }
}

/// Reload the thread list wholesale and reconcile unread flags.
/// Realtime thread payloads lack the derived participant lists, so a
/// full `list_threads_for_user` is the only safe refresh.
async fn refresh_threads(inner: &Arc<ViewInner>, user: Uuid) -> Result<(), CommsError> {
    let threads = run_blocking(&inner.client.db, move |db| db.list_threads_for_user(user))
        .await?;
    let unread_ids = run_blocking(&inner.client.db, move |db| {
        db.unread_thread_ids_for_user(user)
    })
    .await?;

    if !inner.live.load(Ordering::Acquire) {
        return Ok(());
    }

    *inner.threads.lock().expect("thread list poisoned") = threads;
    let count = {
        let mut unread = inner
            .client
            .state
            .unread
            .lock()
            .expect("unread state poisoned");
        unread.seed(&unread_ids);
        unread.thread_count()
    };
    inner.client.badge.publish(count);
    Ok(())
}

/// View channel: appends to the open conversation (deduped by message
/// id, since the transport is at-least-once) and keeps the thread list
/// fresh. Failures are logged and swallowed like every listener path.
async fn on_view_insert(weak: Weak<ViewInner>, event: FeedEvent, user: Uuid) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    if !inner.live.load(Ordering::Acquire) {
        return;
    }

    match event.payload {
        TablePayload::Messages(message) => {
            let active = *inner
                .client
                .state
                .active_thread
                .read()
                .expect("active thread poisoned");

            if active == Some(message.thread_id) {
                let thread_id = message.thread_id;
                let from_other = message.sender_id != user;
                {
                    let mut messages =
                        inner.messages.lock().expect("message list poisoned");
                    if messages.iter().any(|m| m.id == message.id) {
                        debug!("Dropping duplicate message {}", message.id);
                        return;
                    }
                    messages.push(message);
                }

                // The conversation is on screen: mark it read right away.
                if from_other {
                    match run_blocking(&inner.client.db, move |db| {
                        db.mark_thread_read(thread_id, user)
                    })
                    .await
                    {
                        Ok(_) => {
                            let count = {
                                let mut unread = inner
                                    .client
                                    .state
                                    .unread
                                    .lock()
                                    .expect("unread state poisoned");
                                unread.clear(thread_id);
                                unread.thread_count()
                            };
                            inner.client.badge.publish(count);
                        }
                        Err(e) => {
                            warn!("Mark-read after live append failed: {}", e);
                        }
                    }
                }
            } else if message.sender_id != user {
                // Not the open conversation: flip the row's flag and
                // publish the new count. The global listener publishes
                // for the same event too; the flip is idempotent and
                // the signal is whole-value, so double processing is
                // harmless.
                let known = inner
                    .threads
                    .lock()
                    .expect("thread list poisoned")
                    .iter()
                    .any(|t| t.id == message.thread_id);
                if known {
                    let count = {
                        let mut unread = inner
                            .client
                            .state
                            .unread
                            .lock()
                            .expect("unread state poisoned");
                        unread.note_incoming(message.thread_id);
                        unread.thread_count()
                    };
                    inner.client.badge.publish(count);
                }
            }
        }
        TablePayload::Threads(_) => {
            if let Err(e) = refresh_threads(&inner, user).await {
                warn!("Thread list refresh failed: {}", e);
            }
        }
    }
}
