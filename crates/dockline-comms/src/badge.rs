use tokio::sync::watch;

/// The process-wide "unread changed" signal. Carries the new
/// authoritative thread count — never a delta — so every surface that
/// renders a badge converges on the same number no matter how many
/// updates it missed.
pub struct UnreadBadge {
    tx: watch::Sender<u64>,
}

impl UnreadBadge {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    pub fn publish(&self, count: u64) {
        self.tx.send_replace(count);
    }

    /// Subscribe a UI surface. The receiver immediately holds the
    /// latest published value.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for UnreadBadge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_subscribers_see_the_same_whole_value() {
        let badge = UnreadBadge::new();
        let navbar = badge.subscribe();
        let sidebar = badge.subscribe();

        badge.publish(2);
        badge.publish(5);

        assert_eq!(*navbar.borrow(), 5);
        assert_eq!(*sidebar.borrow(), 5);
        assert_eq!(badge.current(), 5);
    }

    #[tokio::test]
    async fn late_subscriber_gets_current_value() {
        let badge = UnreadBadge::new();
        badge.publish(3);
        let late = badge.subscribe();
        assert_eq!(*late.borrow(), 3);
    }
}
