//! Prelude module - commonly used types for convenient import.
//!
//! Use `use kestrel_artifact::prelude::*;` to import all essential types.

pub use crate::{
    ArtifactContext, ArtifactError, ArtifactManager, ArtifactResult, ArtifactSource,
    CompositeScope, IsolationPolicy, LoadingScope, LocalScope, RegistryError, RegistryResult,
    ServiceEntry, ServiceRegistry,
};
