//! Completion event publication.

use tokio::sync::broadcast;

/// Events emitted by the payment lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    /// A payment request transitioned into the Completed status. Emitted at
    /// most once per distinct transition.
    RequestCompleted { request_id: String },
}

/// Broadcast bus for payment events.
///
/// Subscribers that lag beyond the channel capacity miss events; completion
/// state remains recoverable from storage.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PaymentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PaymentEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: PaymentEvent) {
        // A send error just means nobody is subscribed right now.
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(?event, "No subscribers for payment event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
