use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

/// How long an urgent alert stays up before auto-dismissing.
const ALERT_TTL: Duration = Duration::from_secs(6);

/// A transient urgent-message alert, naming the sender so the viewer
/// knows who is shouting.
#[derive(Debug, Clone)]
pub struct Alert {
    pub thread_id: Uuid,
    pub thread_title: Option<String>,
    pub sender_name: String,
}

/// Holds the currently-visible alert (if any) and broadcasts new ones
/// to whoever renders them. Alerts auto-dismiss after a TTL; a newer
/// alert's timer never clears an older one thanks to a generation
/// counter.
#[derive(Clone)]
pub struct AlertCenter {
    inner: Arc<AlertInner>,
    ttl: Duration,
}

struct AlertInner {
    tx: broadcast::Sender<Alert>,
    current: Mutex<Option<Alert>>,
    generation: AtomicU64,
}

impl AlertCenter {
    pub fn new() -> Self {
        Self::with_ttl(ALERT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(AlertInner {
                tx,
                current: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            ttl,
        }
    }

    /// Show an alert and schedule its auto-dismiss.
    pub fn show(&self, alert: Alert) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.current.lock().expect("alert slot poisoned") = Some(alert.clone());
        let _ = self.inner.tx.send(alert);

        let inner = self.inner.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            // Only clear if no newer alert replaced this one.
            if inner.generation.load(Ordering::SeqCst) == generation {
                *inner.current.lock().expect("alert slot poisoned") = None;
            }
        });
    }

    pub fn dismiss(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.current.lock().expect("alert slot poisoned") = None;
    }

    pub fn current(&self) -> Option<Alert> {
        self.inner.current.lock().expect("alert slot poisoned").clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.inner.tx.subscribe()
    }
}

impl Default for AlertCenter {
    fn default() -> Self {
        Self::new()
    }
}
