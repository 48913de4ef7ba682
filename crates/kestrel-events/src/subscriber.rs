//! Synchronous event subscribers.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::event::KestrelEvent;

/// Filter function type for event subscribers.
pub type EventFilter = Box<dyn Fn(&KestrelEvent) -> bool + Send + Sync>;

/// Trait for synchronous event subscribers.
///
/// `on_event` runs on the publishing thread. A slow subscriber stalls the
/// publisher, and with it any lifecycle transition that publishes.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event is published.
    ///
    /// The bus is passed so that a subscriber can unregister itself or
    /// publish follow-up events without holding a reference of its own.
    fn on_event(&self, event: &KestrelEvent, bus: &EventBus);

    /// Return `true` to receive the event. Accepts everything by default.
    fn accepts(&self, event: &KestrelEvent) -> bool {
        let _ = event;
        true
    }

    /// Name used in logs.
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Registration handle for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

type Slot = (SubscriberId, Arc<dyn EventSubscriber>);

/// Subscribers in registration order.
///
/// Delivery iterates over a snapshot, so subscribers may register or
/// unregister (themselves included) from inside `on_event`.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<Vec<Slot>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscriber_count", &self.len())
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Append a subscriber. It only sees events published from now on.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        let id = SubscriberId::new();
        let name = subscriber.name().to_string();

        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));

        debug!(subscriber_name = %name, "Subscriber registered");
        id
    }

    /// Remove a subscriber. Returns `true` if it was present.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let removed = {
            let mut subs = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            subs.iter()
                .position(|(sid, _)| *sid == id)
                .map(|idx| subs.remove(idx))
        };

        // Dropped outside the lock: a subscriber's Drop may publish.
        match removed {
            Some(slot) => {
                debug!(subscriber_name = %slot.1.name(), "Subscriber unregistered");
                drop(slot);
                true
            },
            None => false,
        }
    }

    /// Deliver an event to every accepting subscriber, in registration order.
    ///
    /// A panicking subscriber is logged and skipped. Returns the number of
    /// subscribers that handled the event without panicking.
    pub fn notify(&self, event: &KestrelEvent, bus: &EventBus) -> usize {
        let snapshot: Vec<Slot> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0usize;
        for (id, subscriber) in &snapshot {
            if !subscriber.accepts(event) {
                continue;
            }
            trace!(
                subscriber_name = %subscriber.name(),
                event_type = %event.event_type(),
                "Notifying subscriber"
            );

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_event(event, bus);
            }));

            match result {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(e) => {
                    let message = e
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| e.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    warn!(
                        subscriber_id = ?id,
                        subscriber_name = %subscriber.name(),
                        event_type = %event.event_type(),
                        panic = %message,
                        "Subscriber panicked"
                    );
                },
            }
        }
        delivered
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no subscribers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every subscriber.
    pub fn clear(&self) {
        let drained: Vec<Slot> = std::mem::take(
            &mut *self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        debug!(count = drained.len(), "All subscribers cleared");
        drop(drained);
    }
}

/// A closure-based subscriber with an optional filter.
pub struct FilterSubscriber<F>
where
    F: Fn(&KestrelEvent) + Send + Sync,
{
    name: String,
    filter: Option<EventFilter>,
    handler: F,
}

impl<F> FilterSubscriber<F>
where
    F: Fn(&KestrelEvent) + Send + Sync,
{
    /// Create a subscriber that receives every event.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            filter: None,
            handler,
        }
    }

    /// Only deliver events for which `filter` returns `true`.
    #[must_use]
    pub fn with_filter(
        mut self,
        filter: impl Fn(&KestrelEvent) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }
}

impl<F> EventSubscriber for FilterSubscriber<F>
where
    F: Fn(&KestrelEvent) + Send + Sync,
{
    fn on_event(&self, event: &KestrelEvent, _bus: &EventBus) {
        (self.handler)(event);
    }

    fn accepts(&self, event: &KestrelEvent) -> bool {
        self.filter.as_ref().is_none_or(|f| f(event))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
