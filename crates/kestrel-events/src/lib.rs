//! Kestrel Events - Event bus for the Kestrel microkernel.
//!
//! This crate provides:
//! - Event types for registry changes, artifact loads and kernel lifecycle
//! - A synchronous, ordered subscriber registry
//! - Broadcast-based async receivers
//!
//! # Architecture
//!
//! Events are published to an `EventBus`. Delivery happens on the publishing
//! thread. There are two ways to subscribe:
//!
//! 1. **Synchronous subscribers**: implementations of `EventSubscriber`
//!    registered with `subscribe_sync`. Called in registration order; a
//!    panicking subscriber is logged and skipped.
//!
//! 2. **Async receivers**: `bus.subscribe()` returns an `EventReceiver`
//!    that can be polled from a tokio task.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use kestrel_events::{EventBus, EventMetadata, FilterSubscriber, KestrelEvent};
//!
//! let bus = EventBus::new();
//! bus.subscribe_sync(Arc::new(FilterSubscriber::new("printer", |event| {
//!     println!("{}", event.event_type());
//! })));
//!
//! bus.publish(KestrelEvent::KernelStarted {
//!     metadata: EventMetadata::new("kernel"),
//!     version: "0.1.0".to_string(),
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;
mod subscriber;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventMetadata, KestrelEvent, RegistrationState, TerminationOperation};
pub use subscriber::{
    EventFilter, EventSubscriber, FilterSubscriber, SubscriberId, SubscriberRegistry,
};
