//! Error types for the kernel.

use thiserror::Error;

use kestrel_artifact::{ArtifactError, RegistryError};
use kestrel_config::ConfigError;
use kestrel_core::{CoordinateError, ServerRole, ServerState};

/// Setup or teardown failure reported by a kernel server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A declared dependency was not `Ready`.
    #[error("dependency {dependency} is {state}, not ready")]
    DependencyNotReady {
        /// The dependency role.
        dependency: ServerRole,
        /// Its state at the time of the check.
        state: ServerState,
    },

    /// Server-specific setup failure.
    #[error("setup failed: {0}")]
    Setup(String),

    /// Server-specific teardown failure.
    #[error("teardown failed: {0}")]
    Teardown(String),

    /// Artifact failure during setup, e.g. a preload.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for kernel server callbacks.
pub type ServerResult<T> = Result<T, ServerError>;

/// Kernel error type.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A server failed to start. Earlier servers were rolled back.
    #[error("{role} server failed to start: {source}")]
    ServerStartFailure {
        /// Failing server.
        role: ServerRole,
        /// What went wrong.
        #[source]
        source: ServerError,
    },

    /// A lifecycle operation was called in the wrong state.
    #[error("cannot {action} {subject} in state {state}")]
    InvalidTransition {
        /// `"kernel"` or a server role name.
        subject: String,
        /// Attempted operation.
        action: &'static str,
        /// State at the time of the call.
        state: ServerState,
    },

    /// The operation needs a running kernel.
    #[error("kernel is {state}, not ready")]
    NotRunning {
        /// Kernel status at the time of the call.
        state: ServerState,
    },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed coordinate in configuration.
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    /// Artifact error.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Service registry error.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Handoff file could not be encoded.
    #[error("failed to encode handoff: {0}")]
    HandoffEncode(#[from] toml::ser::Error),

    /// Handoff file could not be decoded.
    #[error("failed to decode handoff: {0}")]
    HandoffDecode(#[from] toml::de::Error),

    /// I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
