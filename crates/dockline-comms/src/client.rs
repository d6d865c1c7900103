use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::{debug, info, warn};
use uuid::Uuid;

use dockline_realtime::{ChannelManager, Feed, GLOBAL_TOPIC};
use dockline_store::Database;
use dockline_types::events::{FeedEvent, TablePayload};
use dockline_types::models::Message;

use crate::alerts::{Alert, AlertCenter};
use crate::badge::UnreadBadge;
use crate::composer::Composer;
use crate::error::CommsError;
use crate::run_blocking;
use crate::unread::UnreadState;

/// Session-local state shared between the global listener and the
/// Communications view.
pub(crate) struct SessionState {
    pub(crate) unread: Mutex<UnreadState>,
    /// The conversation currently open in the view, if any. The global
    /// listener skips its events — the view channel handles them and
    /// marks them read immediately.
    pub(crate) active_thread: RwLock<Option<Uuid>>,
}

pub(crate) struct ClientInner {
    pub(crate) db: Arc<Database>,
    pub(crate) channels: ChannelManager,
    pub(crate) badge: UnreadBadge,
    pub(crate) alerts: AlertCenter,
    pub(crate) composer: Composer,
    pub(crate) state: SessionState,
}

/// The per-session communications client. Owns the one global
/// realtime channel, the unread badge signal, and the alert center.
#[derive(Clone)]
pub struct CommsClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl CommsClient {
    pub fn new(db: Arc<Database>, feed: Feed) -> Self {
        let channels = ChannelManager::new(feed.clone());
        let composer = Composer::new(db.clone(), feed);
        Self {
            inner: Arc::new(ClientInner {
                db,
                channels,
                badge: UnreadBadge::new(),
                alerts: AlertCenter::new(),
                composer,
                state: SessionState {
                    unread: Mutex::new(UnreadState::new()),
                    active_thread: RwLock::new(None),
                },
            }),
        }
    }

    /// Resolve the session user, mount the global listener, and seed
    /// the badge from the authoritative aggregate. Logging in again
    /// replaces the previous global channel rather than stacking a
    /// second one.
    pub async fn login(&self, user_id: Uuid) -> Result<u64, CommsError> {
        self.inner.channels.set_current_user(user_id);

        let weak = Arc::downgrade(&self.inner);
        self.inner.channels.subscribe(GLOBAL_TOPIC, move |event, user| {
            let weak = weak.clone();
            async move {
                on_global_insert(weak, event, user).await;
            }
        });

        // Authoritative badge seed, then the per-thread reconciliation.
        let count = run_blocking(&self.inner.db, move |db| db.count_unread_for_user(user_id))
            .await?;
        let ids = run_blocking(&self.inner.db, move |db| {
            db.unread_thread_ids_for_user(user_id)
        })
        .await?;

        self.inner
            .state
            .unread
            .lock()
            .expect("unread state poisoned")
            .seed(&ids);
        self.inner.badge.publish(count);

        info!("User {} logged in, {} unread threads", user_id, count);
        Ok(count)
    }

    /// Clear the session. Tears down every channel still subscribed
    /// for the old user so nothing keeps reacting on their behalf.
    pub fn logout(&self) {
        self.inner.channels.clear_current_user();
        *self
            .inner
            .state
            .active_thread
            .write()
            .expect("active thread poisoned") = None;
        self.inner
            .state
            .unread
            .lock()
            .expect("unread state poisoned")
            .reset();
        self.inner.badge.publish(0);
        info!("Session cleared");
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.inner.channels.current_user()
    }

    pub fn composer(&self) -> &Composer {
        &self.inner.composer
    }

    pub fn badge(&self) -> &UnreadBadge {
        &self.inner.badge
    }

    pub fn alerts(&self) -> &AlertCenter {
        &self.inner.alerts
    }

    pub fn is_thread_unread(&self, thread_id: Uuid) -> bool {
        self.inner
            .state
            .unread
            .lock()
            .expect("unread state poisoned")
            .is_unread(thread_id)
    }
}

/// Global listener: badge accounting first, alerting second. Nothing
/// on this path may propagate an error — it runs for the whole session
/// and unrelated UI must not see its failures.
async fn on_global_insert(weak: Weak<ClientInner>, event: FeedEvent, user: Uuid) {
    let Some(inner) = weak.upgrade() else {
        return;
    };

    let message = match event.payload {
        TablePayload::Messages(message) => message,
        // A fresh thread has no unread messages yet; the view refreshes
        // its list from its own channel.
        TablePayload::Threads(_) => return,
    };

    if message.sender_id == user {
        return;
    }

    // The open conversation is the view channel's job: it appends the
    // message and marks it read immediately, so no badge bump and no
    // alert here.
    let active = *inner
        .state
        .active_thread
        .read()
        .expect("active thread poisoned");
    if active == Some(message.thread_id) {
        return;
    }

    // Membership probe — expected to come back negative for threads
    // this user is not part of.
    let thread_id = message.thread_id;
    let member = match run_blocking(&inner.db, move |db| db.is_participant(thread_id, user)).await
    {
        Ok(member) => member,
        Err(e) => {
            warn!("Membership probe for thread {} failed: {}", thread_id, e);
            return;
        }
    };
    if !member {
        debug!("Ignoring message in thread {} (not a participant)", thread_id);
        return;
    }

    // The view channel may have flipped this flag while we were at
    // the membership probe. The signal carries a whole value, so
    // publish regardless of whether the flip happened here.
    let count = {
        let mut unread = inner.state.unread.lock().expect("unread state poisoned");
        unread.note_incoming(thread_id);
        unread.thread_count()
    };
    inner.badge.publish(count);

    // Secondary duty: the urgent alert. Lookup failures are logged and
    // swallowed so they can never block badge updates.
    if let Err(e) = notify_if_urgent(&inner, &message).await {
        warn!("Urgent alert path failed for thread {}: {}", thread_id, e);
    }
}

async fn notify_if_urgent(inner: &Arc<ClientInner>, message: &Message) -> Result<(), CommsError> {
    let thread_id = message.thread_id;
    let thread = run_blocking(&inner.db, move |db| db.get_thread(thread_id)).await?;
    let Some(thread) = thread else {
        return Ok(());
    };
    if !thread.urgent {
        return Ok(());
    }

    let sender_id = message.sender_id;
    let sender_name = run_blocking(&inner.db, move |db| db.display_name(sender_id)).await?;

    inner.alerts.show(Alert {
        thread_id,
        thread_title: thread.title,
        sender_name,
    });
    Ok(())
}
