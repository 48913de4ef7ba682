//! Event types for the Kestrel event bus.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kestrel_core::{Coordinate, ServerRole, ServerState};

/// Metadata attached to every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Correlation ID for tracing related events.
    pub correlation_id: Option<Uuid>,
    /// Source component that generated the event.
    pub source: String,
}

impl EventMetadata {
    /// Create new event metadata.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: None,
            source: source.into(),
        }
    }

    /// Set correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Whether a registry change added or removed an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    /// The entry was added.
    Registered,
    /// The entry was removed.
    Unregistered,
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registered => "registered",
            Self::Unregistered => "unregistered",
        })
    }
}

/// Operation carried by a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationOperation {
    /// Relaunch, optionally from an updated artifact location.
    Restart,
    /// Relaunch after clearing the on-disk artifact cache.
    Clean,
}

impl fmt::Display for TerminationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Restart => "restart",
            Self::Clean => "clean",
        })
    }
}

/// All events published inside a Kestrel kernel.
///
/// Events are immutable once published and are never replayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KestrelEvent {
    // ========== Service Registry ==========
    /// A service entry was registered or unregistered.
    ServiceRegistry {
        /// Event metadata.
        metadata: EventMetadata,
        /// Owning artifact.
        coordinate: Coordinate,
        /// Service contract name.
        contract: String,
        /// What happened.
        state: RegistrationState,
    },

    // ========== Artifacts ==========
    /// An artifact finished loading.
    ArtifactLoaded {
        /// Event metadata.
        metadata: EventMetadata,
        /// Loaded artifact.
        coordinate: Coordinate,
        /// Isolation policy name.
        isolation: String,
    },

    /// An artifact was unloaded.
    ArtifactUnloaded {
        /// Event metadata.
        metadata: EventMetadata,
        /// Unloaded artifact.
        coordinate: Coordinate,
    },

    // ========== Kernel Lifecycle ==========
    /// A kernel server changed lifecycle state.
    ServerStateChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// Server role.
        role: ServerRole,
        /// Previous state.
        from: ServerState,
        /// New state.
        to: ServerState,
    },

    /// Every kernel server reached `Ready`.
    KernelStarted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Kernel version.
        version: String,
    },

    /// The kernel is about to stop its servers.
    KernelStopped {
        /// Event metadata.
        metadata: EventMetadata,
        /// Reason for stopping.
        reason: Option<String>,
    },

    /// Running code asked the launcher to replace the process.
    TerminationRequested {
        /// Event metadata.
        metadata: EventMetadata,
        /// Requested operation.
        operation: TerminationOperation,
        /// Updated artifact location, for restarts.
        location: Option<String>,
    },
}

impl KestrelEvent {
    /// Snake-case name of the event variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceRegistry { .. } => "service_registry",
            Self::ArtifactLoaded { .. } => "artifact_loaded",
            Self::ArtifactUnloaded { .. } => "artifact_unloaded",
            Self::ServerStateChanged { .. } => "server_state_changed",
            Self::KernelStarted { .. } => "kernel_started",
            Self::KernelStopped { .. } => "kernel_stopped",
            Self::TerminationRequested { .. } => "termination_requested",
        }
    }

    /// Metadata of the event.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::ServiceRegistry { metadata, .. }
            | Self::ArtifactLoaded { metadata, .. }
            | Self::ArtifactUnloaded { metadata, .. }
            | Self::ServerStateChanged { metadata, .. }
            | Self::KernelStarted { metadata, .. }
            | Self::KernelStopped { metadata, .. }
            | Self::TerminationRequested { metadata, .. } => metadata,
        }
    }

    /// The artifact this event concerns, if any.
    #[must_use]
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match self {
            Self::ServiceRegistry { coordinate, .. }
            | Self::ArtifactLoaded { coordinate, .. }
            | Self::ArtifactUnloaded { coordinate, .. } => Some(coordinate),
            _ => None,
        }
    }

    /// Build a registry change event.
    #[must_use]
    pub fn registry_change(
        source: &str,
        coordinate: Coordinate,
        contract: impl Into<String>,
        state: RegistrationState,
    ) -> Self {
        Self::ServiceRegistry {
            metadata: EventMetadata::new(source),
            coordinate,
            contract: contract.into(),
            state,
        }
    }
}
