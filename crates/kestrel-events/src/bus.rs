//! Event bus for broadcasting events to subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::event::KestrelEvent;
use crate::subscriber::{EventSubscriber, SubscriberId, SubscriberRegistry};

/// Default channel capacity for async receivers.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Event bus.
///
/// `publish` is synchronous. Async receivers are fed through a broadcast
/// channel, then every synchronous subscriber is called in registration
/// order on the publishing thread. Events published before a subscription
/// are never delivered to it.
///
/// Clones share both the channel and the subscriber registry. A synchronous
/// subscriber that stores a clone of the bus creates an `Arc` cycle; use the
/// `bus` argument of [`EventSubscriber::on_event`] instead.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<KestrelEvent>>,
    registry: Arc<SubscriberRegistry>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            registry: Arc::new(SubscriberRegistry::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event.
    ///
    /// Subscriber failures are logged and never reported back. Returns the
    /// number of async receivers that received the event.
    pub fn publish(&self, event: KestrelEvent) -> usize {
        let event = Arc::new(event);

        trace!(event_type = %event.event_type(), "Publishing event");

        let count = self.sender.send(Arc::clone(&event)).unwrap_or(0);

        self.registry.notify(&event, self);

        count
    }

    /// Register a synchronous subscriber.
    pub fn subscribe_sync(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        self.registry.register(subscriber)
    }

    /// Remove a synchronous subscriber.
    pub fn unsubscribe_sync(&self, id: SubscriberId) -> bool {
        self.registry.unregister(id)
    }

    /// Subscribe an async receiver.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }

    /// The synchronous subscriber registry.
    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Async receivers plus synchronous subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .receiver_count()
            .saturating_add(self.registry.len())
    }

    /// Channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            registry: Arc::clone(&self.registry),
            capacity: self.capacity,
        }
    }
}

/// Async receiver for events from the bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<KestrelEvent>>,
}

impl EventReceiver {
    pub(crate) fn new(receiver: broadcast::Receiver<Arc<KestrelEvent>>) -> Self {
        Self { receiver }
    }

    /// Receive the next event, or `None` once the bus is gone.
    ///
    /// Lagging receivers skip the dropped events and keep going.
    pub async fn recv(&mut self) -> Option<Arc<KestrelEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<KestrelEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    warn!(skipped = count, "Event receiver lagged, events dropped");
                },
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::event::EventMetadata;
    use crate::subscriber::FilterSubscriber;

    fn started() -> KestrelEvent {
        KestrelEvent::KernelStarted {
            metadata: EventMetadata::new("test"),
            version: "0.1.0".to_string(),
        }
    }

    fn stopped() -> KestrelEvent {
        KestrelEvent::KernelStopped {
            metadata: EventMetadata::new("test"),
            reason: None,
        }
    }

    #[test]
    fn test_event_bus_creation() {
        let bus = EventBus::new();
        assert_eq!(bus.capacity(), DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(EventBus::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn test_sync_delivery_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe_sync(Arc::new(FilterSubscriber::new(name, move |_| {
                log.lock().unwrap().push(name);
            })));
        }

        bus.publish(started());
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe_sync(Arc::new(FilterSubscriber::new("boom", |_| {
            panic!("subscriber failure");
        })));
        let c = Arc::clone(&counter);
        bus.subscribe_sync(Arc::new(FilterSubscriber::new("after", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })));

        bus.publish(started());
        bus.publish(stopped());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        bus.publish(started());

        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe_sync(Arc::new(FilterSubscriber::new("late", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        bus.publish(stopped());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_filter_subscriber() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe_sync(Arc::new(
            FilterSubscriber::new("stops-only", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .with_filter(|e| e.event_type() == "kernel_stopped"),
        ));

        bus.publish(started());
        bus.publish(stopped());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_sync() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let id = bus.subscribe_sync(Arc::new(FilterSubscriber::new("x", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(bus.unsubscribe_sync(id));
        assert!(!bus.unsubscribe_sync(id));
        bus.publish(started());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cloned_bus_shares_subscribers() {
        let bus = EventBus::new();
        let cloned = bus.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        cloned.subscribe_sync(Arc::new(FilterSubscriber::new("x", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })));

        bus.publish(started());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_unregister_from_on_event() {
        struct Unregistering {
            my_id: Mutex<Option<SubscriberId>>,
        }

        impl EventSubscriber for Unregistering {
            fn on_event(&self, _event: &KestrelEvent, bus: &EventBus) {
                if let Some(id) = *self.my_id.lock().unwrap() {
                    bus.unsubscribe_sync(id);
                }
            }
        }

        let bus = EventBus::new();
        let sub = Arc::new(Unregistering {
            my_id: Mutex::new(None),
        });
        let id = bus.subscribe_sync(Arc::clone(&sub) as Arc<dyn EventSubscriber>);
        *sub.my_id.lock().unwrap() = Some(id);

        bus.publish(started());
        assert!(bus.registry().is_empty());
    }

    #[test]
    fn test_publish_from_drop_does_not_deadlock() {
        struct Dropping {
            bus: EventBus,
        }

        impl EventSubscriber for Dropping {
            fn on_event(&self, _event: &KestrelEvent, _bus: &EventBus) {}
        }

        impl Drop for Dropping {
            fn drop(&mut self) {
                self.bus.publish(KestrelEvent::KernelStopped {
                    metadata: EventMetadata::new("drop"),
                    reason: None,
                });
            }
        }

        let bus = EventBus::new();
        let id = bus.subscribe_sync(Arc::new(Dropping { bus: bus.clone() }));
        assert!(bus.unsubscribe_sync(id));
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        assert_eq!(bus.publish(started()), 1);
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "kernel_started");
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_no_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(started()), 0);
    }
}
