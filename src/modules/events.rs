use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::models::QuotaEvent;

/// Destination for quota notifications (the host's event bus)
pub trait EventSink: Send + Sync {
    fn emit(&self, event: QuotaEvent);
}

/// Fans events out to any number of `tokio::sync::broadcast` receivers
pub struct BroadcastEventSink {
    sender: broadcast::Sender<QuotaEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuotaEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: QuotaEvent) {
        // No subscribers is not an error
        if self.sender.send(event).is_err() {
            tracing::trace!("Quota event dropped, no subscribers");
        }
    }
}

/// Keeps every emitted event in memory
#[derive(Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<QuotaEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QuotaEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: QuotaEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
