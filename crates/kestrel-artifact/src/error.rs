//! Error types for artifact loading and service registration.

use std::path::PathBuf;

use thiserror::Error;

use kestrel_core::{Coordinate, CoordinateError};

/// Failure to obtain a local handle for a coordinate.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No source knows the coordinate.
    #[error("artifact {coordinate} is unavailable: {reason}")]
    ResourceUnavailable {
        /// Requested coordinate.
        coordinate: Coordinate,
        /// Why it could not be found.
        reason: String,
    },

    /// The coordinate was found but could not be copied or read.
    #[error("transfer of {coordinate} failed: {reason}")]
    TransferFailed {
        /// Requested coordinate.
        coordinate: Coordinate,
        /// Underlying failure.
        reason: String,
    },
}

impl SourceError {
    pub(crate) fn unavailable(coordinate: &Coordinate, reason: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            coordinate: coordinate.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transfer(coordinate: &Coordinate, reason: impl ToString) -> Self {
        Self::TransferFailed {
            coordinate: coordinate.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for artifact sources.
pub type SourceResult<T> = Result<T, SourceError>;

/// Failure while reading an artifact directory or archive into symbols.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Filesystem or decompression failure.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Entry path is absolute or escapes the artifact root.
    #[error("path traversal detected in entry: {path}")]
    PathTraversal {
        /// Offending entry path.
        path: String,
    },

    /// Symlinks, hardlinks, device nodes and the like.
    #[error("unsafe entry type {entry_type} at {path}")]
    UnsafeEntryType {
        /// Entry type as reported by the reader.
        entry_type: String,
        /// Entry path.
        path: String,
    },

    /// Entry count or total size over the limit.
    #[error("artifact exceeds limit: {message}")]
    LimitExceeded {
        /// Which limit.
        message: String,
    },

    /// Entry name is not valid UTF-8.
    #[error("entry name is not valid UTF-8: {path}")]
    InvalidName {
        /// Entry path, lossily decoded.
        path: String,
    },

    /// Two entries map to the same symbol.
    #[error("duplicate entry for symbol {symbol}")]
    DuplicateEntry {
        /// The symbol both entries map to.
        symbol: String,
    },
}

/// Result type for archive reading.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Artifact manager errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The coordinate is already loaded.
    #[error("artifact {coordinate} is already loaded")]
    DuplicateArtifact {
        /// Loaded coordinate.
        coordinate: Coordinate,
    },

    /// The coordinate is not loaded.
    #[error("artifact {coordinate} is not loaded")]
    ArtifactNotFound {
        /// Requested coordinate.
        coordinate: Coordinate,
    },

    /// Unknown isolation policy name.
    #[error("unknown isolation policy '{value}'; expected none, partial or full")]
    InvalidIsolation {
        /// The rejected name.
        value: String,
    },

    /// Source failure.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Malformed coordinate.
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
}

/// Result type for artifact manager operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Service registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An entry already exists for the key.
    #[error("service '{contract}' is already registered for {coordinate}")]
    AlreadyRegistered {
        /// Owning artifact.
        coordinate: Coordinate,
        /// Contract name.
        contract: String,
    },

    /// No entry exists for the key.
    #[error("service '{contract}' is not registered for {coordinate}")]
    NotRegistered {
        /// Owning artifact.
        coordinate: Coordinate,
        /// Contract name.
        contract: String,
    },

    /// The owning artifact is not loaded.
    #[error("cannot register services for {coordinate}: artifact is not loaded")]
    NotLoaded {
        /// Requested coordinate.
        coordinate: Coordinate,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
