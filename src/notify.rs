// src/notify.rs - Fan-out of user-facing notifications
use autodrop_shared::Notification;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn send(&self, notification: Notification) {
        tracing::info!("Notification: {:?}", notification);
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}
