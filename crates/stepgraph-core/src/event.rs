use crate::types::FlowEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
///
/// The channel is bounded: a subscriber that falls behind loses the oldest
/// events and observes `RecvError::Lagged`. Publishing never blocks.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
