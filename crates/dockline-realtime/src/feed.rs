use std::sync::Arc;

use tokio::sync::broadcast;

use dockline_types::events::FeedEvent;

/// The realtime change feed: every subscriber sees every row-change
/// event, in the order the feed received them. Independent subscribers
/// are independent delivery paths — there is no ordering guarantee
/// between two receivers.
#[derive(Clone)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    tx: broadcast::Sender<FeedEvent>,
}

impl Feed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(FeedInner { tx }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.tx.subscribe()
    }

    /// Publish an event to all current subscribers. A feed with no
    /// subscribers drops the event, which is fine — there is nobody to
    /// notify.
    pub fn publish(&self, event: FeedEvent) {
        let _ = self.inner.tx.send(event);
    }
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}
