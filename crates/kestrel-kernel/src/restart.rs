//! Termination requests as values.
//!
//! Code running inside the kernel never unwinds to ask for a restart. It
//! either returns [`Flow::Terminate`] up its call chain or calls
//! [`TerminationHandle::request`]; the launcher picks up both.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use kestrel_events::{EventBus, EventMetadata, KestrelEvent, TerminationOperation};

/// What the process should do after it stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Termination {
    /// Relaunch, optionally from an updated artifact location.
    Restart {
        /// New location of the kernel artifact, if it moved.
        location: Option<String>,
    },
    /// Clear the artifact cache, then relaunch.
    Clean,
}

impl Termination {
    /// The event-level operation.
    #[must_use]
    pub fn operation(&self) -> TerminationOperation {
        match self {
            Self::Restart { .. } => TerminationOperation::Restart,
            Self::Clean => TerminationOperation::Clean,
        }
    }

    /// Updated location, for restarts.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Restart { location } => location.as_deref(),
            Self::Clean => None,
        }
    }
}

/// Result of a step that may ask the process to terminate.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Flow<T> {
    /// Keep going with this value.
    Continue(T),
    /// Stop and hand the request to the launcher.
    Terminate(Termination),
}

impl<T> Flow<T> {
    /// Whether this is a termination request.
    pub fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate(_))
    }

    /// Map the continue value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Flow<U> {
        match self {
            Self::Continue(value) => Flow::Continue(f(value)),
            Self::Terminate(t) => Flow::Terminate(t),
        }
    }

    /// Chain another step unless terminating.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Flow<U>) -> Flow<U> {
        match self {
            Self::Continue(value) => f(value),
            Self::Terminate(t) => Flow::Terminate(t),
        }
    }
}

/// Pending termination request of one process.
///
/// A later request replaces an earlier one.
#[derive(Debug, Default)]
pub struct RestartState {
    pending: Mutex<Option<Termination>>,
}

impl RestartState {
    /// Nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request.
    pub fn record(&self, termination: Termination) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(termination);
    }

    /// Current request, if any.
    #[must_use]
    pub fn pending(&self) -> Option<Termination> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return the current request.
    pub fn take(&self) -> Option<Termination> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Lets in-process code ask the launcher to terminate.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    sender: mpsc::UnboundedSender<Termination>,
    state: Arc<RestartState>,
    bus: EventBus,
}

impl TerminationHandle {
    pub(crate) fn new(
        sender: mpsc::UnboundedSender<Termination>,
        state: Arc<RestartState>,
        bus: EventBus,
    ) -> Self {
        Self { sender, state, bus }
    }

    /// Record `termination` and wake the run loop.
    ///
    /// Returns `false` if no run loop is listening; the request is still
    /// recorded and will be honoured by whoever reads the restart state.
    pub fn request(&self, termination: Termination) -> bool {
        info!(
            operation = %termination.operation(),
            location = termination.location().unwrap_or("-"),
            "termination requested"
        );
        self.state.record(termination.clone());
        self.bus.publish(KestrelEvent::TerminationRequested {
            metadata: EventMetadata::new("kernel"),
            operation: termination.operation(),
            location: termination.location().map(str::to_string),
        });
        self.sender.send(termination).is_ok()
    }

    /// Request a restart.
    pub fn restart(&self, location: Option<String>) -> bool {
        self.request(Termination::Restart { location })
    }

    /// Request a clean restart.
    pub fn clean(&self) -> bool {
        self.request(Termination::Clean)
    }
}
