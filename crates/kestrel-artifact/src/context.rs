//! The record of one loaded artifact.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use kestrel_core::{Coordinate, KernelId};

use crate::isolation::IsolationPolicy;
use crate::scope::{CompositeScope, LoadingScope, LocalScope};

/// A loaded artifact.
///
/// Immutable once created. Identity, equality and hashing use the
/// coordinate alone.
#[derive(Debug)]
pub struct ArtifactContext {
    coordinate: Coordinate,
    location: PathBuf,
    scope: Arc<CompositeScope>,
    local: Arc<LocalScope>,
    isolation: IsolationPolicy,
    kernel_id: KernelId,
    loaded_at: DateTime<Utc>,
    sequence: u64,
}

impl ArtifactContext {
    pub(crate) fn new(
        coordinate: Coordinate,
        location: PathBuf,
        scope: Arc<CompositeScope>,
        local: Arc<LocalScope>,
        isolation: IsolationPolicy,
        kernel_id: KernelId,
        sequence: u64,
    ) -> Self {
        Self {
            coordinate,
            location,
            scope,
            local,
            isolation,
            kernel_id,
            loaded_at: Utc::now(),
            sequence,
        }
    }

    /// The artifact's coordinate.
    #[must_use]
    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    /// Local path the resource was read from.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The artifact's own composite: local symbols first, then the shared
    /// kernel scope.
    #[must_use]
    pub fn scope(&self) -> &Arc<CompositeScope> {
        &self.scope
    }

    /// Symbols read from the artifact's resource.
    #[must_use]
    pub fn local_scope(&self) -> &Arc<LocalScope> {
        &self.local
    }

    /// Isolation the artifact was loaded with.
    #[must_use]
    pub fn isolation(&self) -> IsolationPolicy {
        self.isolation
    }

    /// Kernel that owns this artifact.
    #[must_use]
    pub fn kernel_id(&self) -> KernelId {
        self.kernel_id
    }

    /// Load time.
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Number of symbols in the local scope.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.local.symbol_count()
    }

    /// Resolve through the artifact's own composite.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Option<Bytes> {
        self.scope.resolve(symbol)
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl PartialEq for ArtifactContext {
    fn eq(&self, other: &Self) -> bool {
        self.coordinate == other.coordinate
    }
}

impl Eq for ArtifactContext {}

impl Hash for ArtifactContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coordinate.hash(state);
    }
}
