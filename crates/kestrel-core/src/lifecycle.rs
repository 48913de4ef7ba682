//! Kernel server roles and lifecycle states.
//!
//! These live here rather than in the kernel crate so that lifecycle events
//! can carry them without a dependency cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The four kernel server roles, in start order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerRole {
    /// Event publication.
    EventBus,
    /// Access to artifact repositories and the local cache.
    Repository,
    /// Artifact loading and the shared scope.
    Artifact,
    /// Service registry.
    Service,
}

impl ServerRole {
    /// All roles in start order.
    pub const START_ORDER: [Self; 4] = [
        Self::EventBus,
        Self::Repository,
        Self::Artifact,
        Self::Service,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EventBus => "event_bus",
            Self::Repository => "repository",
            Self::Artifact => "artifact",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for ServerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a kernel server (or of the kernel as a whole).
///
/// `Ready` and `Stopped` are the only states observable at rest. `Failed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Constructed, never started.
    Created,
    /// Setup in progress.
    Starting,
    /// Running.
    Ready,
    /// Teardown in progress.
    Stopping,
    /// Torn down.
    Stopped,
    /// Setup failed. No further transitions.
    Failed,
}

impl ServerState {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
