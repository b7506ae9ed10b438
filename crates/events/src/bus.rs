//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries both business events raised by producers and the
//! lifecycle events emitted by the dispatcher. It is shared via
//! `Arc<EventBus>` across the application.

use courier_core::{DomainEvent, LifecycleEvent};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusEvent
// ---------------------------------------------------------------------------

/// Everything that travels on the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// A business fact, consumed by the trigger engine.
    Business(DomainEvent),
    /// A notification outcome, consumed by the listener registry.
    Lifecycle(LifecycleEvent),
}

impl BusEvent {
    /// Dot-separated event name, e.g. `"order.placed"` or `"notification.sent"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            BusEvent::Business(event) => event.event_type().as_str(),
            BusEvent::Lifecycle(event) => event.event_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Every subscriber independently receives every published [`BusEvent`].
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest unconsumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Events published while nobody is subscribed are dropped.
    pub fn publish(&self, event: BusEvent) {
        let event_type = event.event_type();
        if self.sender.send(event).is_err() {
            tracing::debug!(event_type, "No bus subscribers, event dropped");
        }
    }

    pub fn publish_business(&self, event: DomainEvent) {
        self.publish(BusEvent::Business(event));
    }

    pub fn publish_lifecycle(&self, event: LifecycleEvent) {
        self.publish(BusEvent::Lifecycle(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
