//! Hook for the event-created notification fan-out.

use crate::types::EventCreated;
use tokio::sync::broadcast::{self, error::RecvError, Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives one call per newly created event.
pub trait EventNotifier: Send + Sync {
    fn event_created(&self, event: EventCreated);
}

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
    fn event_created(&self, _event: EventCreated) {}
}

/// Publishes notifications on a tokio broadcast channel. Sending with no
/// subscribers is not an error.
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: Sender<EventCreated>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<EventCreated> {
        self.sender.subscribe()
    }

    /// Log every notification until the channel closes.
    pub fn spawn_logger(&self) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => info!("📣 New event {} '{}'", event.event_id, event.name),
                    Err(RecvError::Lagged(missed)) => warn!("Notification logger missed {} events", missed),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

impl EventNotifier for BroadcastNotifier {
    fn event_created(&self, event: EventCreated) {
        if self.sender.send(event).is_err() {
            debug!("No notification subscribers");
        }
    }
}
