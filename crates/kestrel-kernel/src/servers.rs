//! The four built-in kernel servers.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use kestrel_artifact::{ArtifactManager, IsolationPolicy, ServiceRegistry};
use kestrel_core::{Coordinate, ServerRole};
use kestrel_events::EventBus;

use crate::error::ServerResult;
use crate::server::KernelServer;

/// Owns the event bus. Stopping it drops every synchronous subscriber.
#[derive(Debug)]
pub struct EventBusServer {
    bus: EventBus,
}

impl EventBusServer {
    /// Wrap `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl KernelServer for EventBusServer {
    fn role(&self) -> ServerRole {
        ServerRole::EventBus
    }

    fn start(&self) -> ServerResult<()> {
        debug!(capacity = self.bus.capacity(), "event bus ready");
        Ok(())
    }

    fn stop(&self) -> ServerResult<()> {
        let subscribers = self.bus.registry().len();
        self.bus.registry().clear();
        debug!(subscribers, "event bus subscribers released");
        Ok(())
    }
}

/// Prepares the local artifact cache.
#[derive(Debug)]
pub struct RepositoryServer {
    cache_dir: Option<PathBuf>,
}

impl RepositoryServer {
    /// `cache_dir` is created on start when given.
    #[must_use]
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }
}

impl KernelServer for RepositoryServer {
    fn role(&self) -> ServerRole {
        ServerRole::Repository
    }

    fn start(&self) -> ServerResult<()> {
        if let Some(dir) = &self.cache_dir {
            std::fs::create_dir_all(dir)?;
            info!(path = %dir.display(), "artifact cache ready");
        }
        Ok(())
    }

    fn stop(&self) -> ServerResult<()> {
        Ok(())
    }
}

/// Loads the preload set on start and unloads everything on stop.
#[derive(Debug)]
pub struct ArtifactServer {
    manager: Arc<ArtifactManager>,
    preload: Vec<(Coordinate, IsolationPolicy)>,
}

impl ArtifactServer {
    /// Serve `manager`, loading `preload` in order on start.
    #[must_use]
    pub fn new(manager: Arc<ArtifactManager>, preload: Vec<(Coordinate, IsolationPolicy)>) -> Self {
        Self { manager, preload }
    }
}

impl KernelServer for ArtifactServer {
    fn role(&self) -> ServerRole {
        ServerRole::Artifact
    }

    fn start(&self) -> ServerResult<()> {
        for (coordinate, isolation) in &self.preload {
            if let Err(e) = self.manager.load(coordinate, *isolation) {
                self.manager.unload_all();
                return Err(e.into());
            }
        }
        if !self.preload.is_empty() {
            info!(count = self.preload.len(), "preloaded artifacts");
        }
        Ok(())
    }

    fn stop(&self) -> ServerResult<()> {
        let unloaded = self.manager.unload_all();
        debug!(unloaded, "artifacts unloaded");
        Ok(())
    }
}

/// Clears the service registry on stop.
#[derive(Debug)]
pub struct ServiceServer {
    registry: Arc<ServiceRegistry>,
}

impl ServiceServer {
    /// Serve `registry`.
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

impl KernelServer for ServiceServer {
    fn role(&self) -> ServerRole {
        ServerRole::Service
    }

    fn start(&self) -> ServerResult<()> {
        debug!(entries = self.registry.len(), "service registry ready");
        Ok(())
    }

    fn stop(&self) -> ServerResult<()> {
        let removed = self.registry.unregister_all();
        debug!(removed, "services unregistered");
        Ok(())
    }
}
