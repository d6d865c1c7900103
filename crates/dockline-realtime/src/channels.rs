use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use dockline_types::events::{ChangeKind, FeedEvent};

use crate::feed::Feed;

/// The one session-lifetime listener. Named identically across mounts
/// so remounting replaces the previous subscription instead of piling
/// up a new one.
pub const GLOBAL_TOPIC: &str = "comms:global";

/// The listener scoped to the Communications view; exists only while
/// the view is mounted.
pub const VIEW_TOPIC: &str = "comms:view";

struct ChannelHandle {
    live: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    /// Synchronous teardown: flip the live flag first so an event
    /// already pulled off the feed is dropped, then abort the task.
    fn teardown(self) {
        self.live.store(false, Ordering::Release);
        self.task.abort();
    }
}

/// Registry of named realtime subscriptions with create-or-replace
/// semantics. Each subscription is a task draining the feed; events
/// are dispatched to the topic's handler only once the current user's
/// identity has been resolved.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    feed: Feed,
    channels: Mutex<HashMap<String, ChannelHandle>>,
    current_user: RwLock<Option<Uuid>>,
}

impl ChannelManager {
    pub fn new(feed: Feed) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                feed,
                channels: Mutex::new(HashMap::new()),
                current_user: RwLock::new(None),
            }),
        }
    }

    /// Resolve the session's user. Until this has been called, every
    /// channel is a guarded no-op.
    pub fn set_current_user(&self, user_id: Uuid) {
        *self
            .inner
            .current_user
            .write()
            .expect("current_user lock poisoned") = Some(user_id);
    }

    /// Forget the session's user and tear down every channel still
    /// subscribed on its behalf.
    pub fn clear_current_user(&self) {
        *self
            .inner
            .current_user
            .write()
            .expect("current_user lock poisoned") = None;
        self.teardown_all();
    }

    pub fn current_user(&self) -> Option<Uuid> {
        *self
            .inner
            .current_user
            .read()
            .expect("current_user lock poisoned")
    }

    /// Subscribe a handler under a topic name. Any existing channel
    /// with the same name is torn down first, so rapid mount/unmount
    /// cycles never leave two tasks on one topic. The handler runs
    /// once per INSERT event; other change kinds are skipped here.
    ///
    /// Handlers must tolerate at-least-once delivery: the transport
    /// may replay events across reconnects.
    pub fn subscribe<F, Fut>(&self, topic: &str, handler: F)
    where
        F: Fn(FeedEvent, Uuid) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let live = Arc::new(AtomicBool::new(true));
        let task_live = live.clone();
        let inner = self.inner.clone();
        let mut rx = self.inner.feed.subscribe();
        let task_topic = topic.to_string();

        let task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Channel '{}' lagged by {} events", task_topic, n);
                        continue;
                    }
                    Err(_) => break,
                };

                if !task_live.load(Ordering::Acquire) {
                    break;
                }
                if event.event != ChangeKind::Insert {
                    continue;
                }

                // No identity yet: guarded no-op.
                let user = *inner
                    .current_user
                    .read()
                    .expect("current_user lock poisoned");
                let Some(user) = user else {
                    continue;
                };

                handler(event, user).await;
            }
        });

        let mut channels = self.inner.channels.lock().expect("channel registry poisoned");
        if let Some(previous) = channels.insert(topic.to_string(), ChannelHandle { live, task }) {
            debug!("Replacing existing channel '{}'", topic);
            previous.teardown();
        }
    }

    /// Tear down one channel synchronously. A no-op if the topic is
    /// not subscribed.
    pub fn unsubscribe(&self, topic: &str) {
        let removed = self
            .inner
            .channels
            .lock()
            .expect("channel registry poisoned")
            .remove(topic);
        if let Some(handle) = removed {
            debug!("Tearing down channel '{}'", topic);
            handle.teardown();
        }
    }

    pub fn teardown_all(&self) {
        let drained: Vec<ChannelHandle> = {
            let mut channels = self.inner.channels.lock().expect("channel registry poisoned");
            channels.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            handle.teardown();
        }
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner
            .channels
            .lock()
            .expect("channel registry poisoned")
            .contains_key(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockline_types::models::Message;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    fn any_message() -> Message {
        Message::new(Uuid::new_v4(), Uuid::new_v4(), "on the move")
    }

    #[tokio::test]
    async fn events_are_held_until_user_is_resolved() {
        let feed = Feed::new();
        let manager = ChannelManager::new(feed.clone());
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        manager.subscribe("test", move |_event, _user| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        feed.publish(FeedEvent::message_insert(any_message()));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        manager.set_current_user(Uuid::new_v4());
        feed.publish(FeedEvent::message_insert(any_message()));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resubscribing_replaces_the_previous_channel() {
        let feed = Feed::new();
        let manager = ChannelManager::new(feed.clone());
        manager.set_current_user(Uuid::new_v4());

        let (tx, mut rx) = mpsc::unbounded_channel();

        for tag in ["old", "new"] {
            let tx = tx.clone();
            manager.subscribe(GLOBAL_TOPIC, move |_event, _user| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(tag);
                }
            });
        }

        feed.publish(FeedEvent::message_insert(any_message()));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut tags = Vec::new();
        while let Ok(tag) = rx.try_recv() {
            tags.push(tag);
        }
        assert_eq!(tags, vec!["new"]);
    }

    #[tokio::test]
    async fn unsubscribe_is_synchronous_and_idempotent() {
        let feed = Feed::new();
        let manager = ChannelManager::new(feed.clone());
        manager.set_current_user(Uuid::new_v4());

        manager.subscribe(VIEW_TOPIC, |_event, _user| async {});
        assert!(manager.is_subscribed(VIEW_TOPIC));

        manager.unsubscribe(VIEW_TOPIC);
        assert!(!manager.is_subscribed(VIEW_TOPIC));
        manager.unsubscribe(VIEW_TOPIC);
    }

    #[tokio::test]
    async fn logout_tears_down_stale_channels() {
        let feed = Feed::new();
        let manager = ChannelManager::new(feed.clone());
        manager.set_current_user(Uuid::new_v4());
        manager.subscribe(GLOBAL_TOPIC, |_event, _user| async {});

        manager.clear_current_user();
        assert!(!manager.is_subscribed(GLOBAL_TOPIC));
        assert_eq!(manager.current_user(), None);
    }
}
