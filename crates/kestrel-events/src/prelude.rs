//! Prelude module - commonly used types for convenient import.
//!
//! Use `use kestrel_events::prelude::*;` to import all essential types.

// Bus
pub use crate::{EventBus, EventReceiver};

// Events
pub use crate::{EventMetadata, KestrelEvent, RegistrationState, TerminationOperation};

// Subscribers
pub use crate::{EventSubscriber, FilterSubscriber, SubscriberId};
