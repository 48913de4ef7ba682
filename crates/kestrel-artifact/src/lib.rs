//! Kestrel Artifact - artifact loading, isolation and the service registry.
//!
//! This crate provides:
//! - [`LoadingScope`] and its kinds: [`LocalScope`], [`DelegateScope`],
//!   [`CompositeScope`]
//! - [`IsolationPolicy`]: whether an artifact's symbols join the shared scope
//! - [`ArtifactSource`]: where artifact resources come from, with the
//!   [`RepositorySource`] and [`MemorySource`] implementations
//! - [`ArtifactManager`]: load, unload and query artifacts
//! - [`ServiceRegistry`]: services published by loaded artifacts
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kestrel_artifact::{
//!     ArtifactManager, CompositeScope, IsolationPolicy, Repository, RepositorySource,
//!     ServiceRegistry,
//! };
//! use kestrel_core::{Coordinate, KernelId};
//! use kestrel_events::EventBus;
//!
//! let bus = EventBus::new();
//! let source = RepositorySource::new("/var/cache/kestrel")
//!     .with_repository(Repository::new("local", "/srv/artifacts"));
//! let manager = Arc::new(ArtifactManager::new(
//!     KernelId::new(),
//!     Arc::new(source),
//!     Arc::new(CompositeScope::new("shared", 0)),
//!     bus.clone(),
//! ));
//! let services = ServiceRegistry::new(Arc::clone(&manager), bus);
//!
//! let widgets = Coordinate::parse("org.example:widgets:1.0").unwrap();
//! manager.load(&widgets, IsolationPolicy::None).unwrap();
//! services.register(&widgets, "WidgetFactory", Arc::new(42u32)).unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod archive;
mod context;
mod error;
mod isolation;
mod manager;
mod registry;
mod scope;
mod source;

pub use context::ArtifactContext;
pub use error::{
    ArchiveError, ArchiveResult, ArtifactError, ArtifactResult, RegistryError, RegistryResult,
    SourceError, SourceResult,
};
pub use isolation::IsolationPolicy;
pub use manager::{ArtifactManager, ArtifactObserver, LOCAL_PRIORITY, SHARED_PRIORITY};
pub use registry::{ServiceEntry, ServiceInstance, ServiceRegistry};
pub use scope::{CompositeScope, DelegateScope, LoadingScope, LocalScope};
pub use source::{ArtifactSource, MemorySource, Repository, RepositorySource};
