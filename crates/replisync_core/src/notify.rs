//! Change notification ("poke") after successful pushes.
//!
//! Notification is best effort. A lost poke only delays a client until its
//! next scheduled pull; it never affects what that pull returns.

use tokio::sync::broadcast;
use tracing::trace;

/// Receives a signal whenever a partition changes.
pub trait ChangeNotifier: Send + Sync {
    /// Signals that `space_id` has new data. Must not block or fail.
    fn notify(&self, space_id: &str);
}

/// Notifier that drops every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn notify(&self, _space_id: &str) {}
}

/// A partition-changed signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poke {
    /// Partition that changed.
    pub space_id: String,
}

/// Fans pokes out to any number of in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Poke>,
}

impl BroadcastNotifier {
    /// Creates a notifier buffering up to `capacity` pokes per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to future pokes.
    pub fn subscribe(&self) -> broadcast::Receiver<Poke> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn notify(&self, space_id: &str) {
        let poke = Poke {
            space_id: space_id.to_string(),
        };
        // No subscribers is fine; clients still converge by polling.
        if self.sender.send(poke).is_err() {
            trace!(space_id, "Poke dropped, no subscribers");
        }
    }
}
