//! The kernel: four servers started in dependency order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use kestrel_artifact::{
    ArtifactContext, ArtifactManager, ArtifactSource, CompositeScope, IsolationPolicy, LocalScope,
    MemorySource, Repository, RepositorySource, ServiceRegistry,
};
use kestrel_config::Config;
use kestrel_core::{Coordinate, KernelId, KestrelHome, ServerRole, ServerState};
use kestrel_events::{EventBus, EventMetadata, KestrelEvent};

use crate::error::{KernelError, KernelResult, ServerError};
use crate::restart::{RestartState, Termination, TerminationHandle};
use crate::server::{KernelServer, ManagedServer};
use crate::servers::{ArtifactServer, EventBusServer, RepositoryServer, ServiceServer};

/// Name of the kernel's own scope inside the shared composite.
pub const SYSTEM_SCOPE: &str = "system";

/// Symbol under which the system scope publishes the kernel version.
pub const VERSION_SYMBOL: &str = "kestrel/version";

/// Id of the repository added for `--artifact-location`.
pub const LOCATION_REPOSITORY_ID: &str = "artifact-location";

/// An in-process microkernel.
///
/// Servers start in the order event bus, repository, artifact, service and
/// stop in exactly the reverse order.
pub struct Kernel {
    id: KernelId,
    artifact: Coordinate,
    bus: EventBus,
    artifacts: Arc<ArtifactManager>,
    services: Arc<ServiceRegistry>,
    servers: Vec<ManagedServer>,
    status: Mutex<ServerState>,
    restart_state: Arc<RestartState>,
    termination: TerminationHandle,
    termination_rx: Mutex<Option<mpsc::UnboundedReceiver<Termination>>>,
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("id", &self.id)
            .field("artifact", &self.artifact)
            .field("status", &self.status())
            .field("servers", &self.servers)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Start a builder.
    #[must_use]
    pub fn builder(artifact: Coordinate) -> KernelBuilder {
        KernelBuilder::new(artifact)
    }

    /// Start every server in order.
    ///
    /// If one fails, the servers already `Ready` are stopped in reverse
    /// order, the kernel becomes `Failed`, and the failure is returned.
    ///
    /// # Errors
    ///
    /// - [`KernelError::InvalidTransition`] unless the kernel is `Created`
    /// - [`KernelError::ServerStartFailure`] for the first failing server
    pub fn start(&self) -> KernelResult<()> {
        self.enter(ServerState::Created, ServerState::Starting, "start")?;
        info!(kernel = %self.id, artifact = %self.artifact, "kernel starting");

        let hook = |role, from, to| self.on_transition(role, from, to);
        for (index, server) in self.servers.iter().enumerate() {
            let result = match self.unready_dependency(server) {
                Some(failure) => Err(server.fail(failure, &hook)),
                None => server.start(&hook),
            };
            if let Err(e) = result {
                error!(
                    kernel = %self.id,
                    role = %server.role(),
                    error = %e,
                    "server start failed, rolling back"
                );
                self.servers
                    .get(..index)
                    .unwrap_or_default()
                    .iter()
                    .rev()
                    .for_each(|s| self.stop_quietly(s));
                self.set_status(ServerState::Failed);
                return Err(e);
            }
        }

        self.set_status(ServerState::Ready);
        info!(kernel = %self.id, "kernel ready");
        self.bus.publish(KestrelEvent::KernelStarted {
            metadata: EventMetadata::new("kernel"),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });
        Ok(())
    }

    /// Stop every `Ready` server in reverse order.
    ///
    /// Individual failures are logged and skipped. A no-op unless the
    /// kernel is `Ready`.
    pub fn stop(&self, reason: Option<&str>) {
        if self.enter(ServerState::Ready, ServerState::Stopping, "stop").is_err() {
            debug!(kernel = %self.id, status = %self.status(), "stop ignored");
            return;
        }
        info!(kernel = %self.id, reason = reason.unwrap_or("-"), "kernel stopping");
        self.bus.publish(KestrelEvent::KernelStopped {
            metadata: EventMetadata::new("kernel"),
            reason: reason.map(str::to_string),
        });

        for server in self.servers.iter().rev() {
            self.stop_quietly(server);
        }

        self.set_status(ServerState::Stopped);
        info!(kernel = %self.id, "kernel stopped");
    }

    /// Load an artifact into the running kernel.
    ///
    /// # Errors
    ///
    /// [`KernelError::NotRunning`] unless the kernel is `Ready`, otherwise
    /// whatever [`ArtifactManager::load`] returns.
    pub fn load(
        &self,
        coordinate: &Coordinate,
        isolation: IsolationPolicy,
    ) -> KernelResult<Arc<ArtifactContext>> {
        self.require_ready()?;
        Ok(self.artifacts.load(coordinate, isolation)?)
    }

    /// Unload an artifact from the running kernel.
    ///
    /// # Errors
    ///
    /// [`KernelError::NotRunning`] unless the kernel is `Ready`, otherwise
    /// whatever [`ArtifactManager::unload`] returns.
    pub fn unload(&self, coordinate: &Coordinate) -> KernelResult<Arc<ArtifactContext>> {
        self.require_ready()?;
        Ok(self.artifacts.unload(coordinate)?)
    }

    /// Kernel identity.
    #[must_use]
    pub fn id(&self) -> KernelId {
        self.id
    }

    /// The kernel's own artifact coordinate.
    #[must_use]
    pub fn artifact(&self) -> &Coordinate {
        &self.artifact
    }

    /// Overall status.
    #[must_use]
    pub fn status(&self) -> ServerState {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// State of the server filling `role`.
    #[must_use]
    pub fn server_state(&self, role: ServerRole) -> Option<ServerState> {
        self.servers
            .iter()
            .find(|s| s.role() == role)
            .map(ManagedServer::state)
    }

    /// Every server's state, in start order.
    #[must_use]
    pub fn server_states(&self) -> Vec<(ServerRole, ServerState)> {
        self.servers.iter().map(|s| (s.role(), s.state())).collect()
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The artifact manager.
    #[must_use]
    pub fn artifacts(&self) -> &Arc<ArtifactManager> {
        &self.artifacts
    }

    /// The service registry.
    #[must_use]
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// The kernel-wide shared composite scope.
    #[must_use]
    pub fn shared_scope(&self) -> &Arc<CompositeScope> {
        self.artifacts.shared_scope()
    }

    /// Process-wide pending termination request.
    #[must_use]
    pub fn restart_state(&self) -> &Arc<RestartState> {
        &self.restart_state
    }

    /// Handle for raising termination requests.
    #[must_use]
    pub fn termination_handle(&self) -> TerminationHandle {
        self.termination.clone()
    }

    /// Receiver of termination requests. Only the first caller gets it.
    pub fn take_termination_receiver(&self) -> Option<mpsc::UnboundedReceiver<Termination>> {
        self.termination_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn require_ready(&self) -> KernelResult<()> {
        match self.status() {
            ServerState::Ready => Ok(()),
            state => Err(KernelError::NotRunning { state }),
        }
    }

    fn enter(
        &self,
        expected: ServerState,
        next: ServerState,
        action: &'static str,
    ) -> KernelResult<()> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status != expected {
            return Err(KernelError::InvalidTransition {
                subject: "kernel".to_string(),
                action,
                state: *status,
            });
        }
        *status = next;
        Ok(())
    }

    fn set_status(&self, state: ServerState) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn unready_dependency(&self, server: &ManagedServer) -> Option<ServerError> {
        server.dependencies().into_iter().find_map(|dependency| {
            let state = self.server_state(dependency).unwrap_or(ServerState::Created);
            (state != ServerState::Ready)
                .then_some(ServerError::DependencyNotReady { dependency, state })
        })
    }

    fn stop_quietly(&self, server: &ManagedServer) {
        if server.state() != ServerState::Ready {
            return;
        }
        let hook = |role, from, to| self.on_transition(role, from, to);
        if let Err(e) = server.stop(&hook) {
            warn!(role = %server.role(), error = %e, "server stop skipped");
        }
    }

    fn on_transition(&self, role: ServerRole, from: ServerState, to: ServerState) {
        if self.server_state(ServerRole::EventBus) == Some(ServerState::Ready) {
            self.bus.publish(KestrelEvent::ServerStateChanged {
                metadata: EventMetadata::new("kernel"),
                role,
                from,
                to,
            });
        }
    }
}

/// Builds a [`Kernel`].
///
/// Any server can be replaced by role before building; the rest are the
/// built-in ones.
pub struct KernelBuilder {
    id: KernelId,
    artifact: Coordinate,
    bus: Option<EventBus>,
    source: Option<Arc<dyn ArtifactSource>>,
    cache_dir: Option<PathBuf>,
    preload: Vec<(Coordinate, IsolationPolicy)>,
    system_symbols: HashMap<String, Bytes>,
    replacements: Vec<Arc<dyn KernelServer>>,
    restart_state: Option<Arc<RestartState>>,
}

impl KernelBuilder {
    /// Builder for a kernel whose own artifact is `artifact`.
    #[must_use]
    pub fn new(artifact: Coordinate) -> Self {
        Self {
            id: KernelId::new(),
            artifact,
            bus: None,
            source: None,
            cache_dir: None,
            preload: Vec::new(),
            system_symbols: HashMap::new(),
            replacements: Vec::new(),
            restart_state: None,
        }
    }

    /// Builder from a loaded configuration.
    ///
    /// Repositories are searched in configuration order, after
    /// `artifact_location` when one is given. The cache is consulted before
    /// any of them, so a coordinate cached by an earlier run keeps its
    /// content until the cache is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel artifact or a preload entry is
    /// malformed.
    pub fn from_config(config: &Config, artifact_location: Option<&str>) -> KernelResult<Self> {
        let artifact = Coordinate::parse(&config.kernel.artifact)?;

        let cache_dir = match &config.cache.path {
            Some(path) => path.clone(),
            None => KestrelHome::resolve()?.cache_dir(),
        };
        let mut source = RepositorySource::new(cache_dir.clone());
        if let Some(location) = artifact_location {
            source = source.with_repository(Repository::new(LOCATION_REPOSITORY_ID, location));
        }
        for repo in &config.repositories {
            let repository =
                Repository::new(repo.id.clone(), repo.path.clone()).enabled(repo.enabled);
            source = source.with_repository(repository);
        }

        let mut builder = Self::new(artifact)
            .source(Arc::new(source))
            .cache_dir(cache_dir);
        for entry in &config.kernel.preload {
            let coordinate = Coordinate::parse(&entry.coordinate)?;
            let isolation: IsolationPolicy = entry.isolation.parse()?;
            builder = builder.preload(coordinate, isolation);
        }
        Ok(builder)
    }

    /// Use an existing event bus.
    #[must_use]
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Where artifacts come from. Defaults to an empty in-memory source.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn ArtifactSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Cache directory created by the repository server.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Load `coordinate` when the artifact server starts.
    #[must_use]
    pub fn preload(mut self, coordinate: Coordinate, isolation: IsolationPolicy) -> Self {
        self.preload.push((coordinate, isolation));
        self
    }

    /// Add a symbol to the kernel's system scope.
    #[must_use]
    pub fn system_symbol(mut self, symbol: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.system_symbols.insert(symbol.into(), bytes.into());
        self
    }

    /// Replace the built-in server for `server.role()`.
    #[must_use]
    pub fn server(mut self, server: Arc<dyn KernelServer>) -> Self {
        self.replacements.push(server);
        self
    }

    /// Share a restart state with the caller.
    #[must_use]
    pub fn restart_state(mut self, state: Arc<RestartState>) -> Self {
        self.restart_state = Some(state);
        self
    }

    /// Build the kernel in state `Created`.
    #[must_use]
    pub fn build(self) -> Kernel {
        let bus = self.bus.unwrap_or_default();
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(MemorySource::new()));

        let shared = Arc::new(CompositeScope::new("shared", 0));
        let mut system = LocalScope::from_symbols(SYSTEM_SCOPE, 0, self.system_symbols);
        system = system.with_symbol(VERSION_SYMBOL, env!("CARGO_PKG_VERSION"));
        shared.add(Arc::new(system));

        let artifacts = Arc::new(ArtifactManager::new(self.id, source, shared, bus.clone()));
        let services = ServiceRegistry::new(Arc::clone(&artifacts), bus.clone());

        let mut defaults: Vec<Arc<dyn KernelServer>> = vec![
            Arc::new(EventBusServer::new(bus.clone())),
            Arc::new(RepositoryServer::new(self.cache_dir)),
            Arc::new(ArtifactServer::new(Arc::clone(&artifacts), self.preload)),
            Arc::new(ServiceServer::new(Arc::clone(&services))),
        ];
        for replacement in self.replacements {
            let role = replacement.role();
            if let Some(slot) = defaults.iter_mut().find(|s| s.role() == role) {
                debug!(role = %role, "server replaced");
                *slot = replacement;
            }
        }

        let restart_state = self.restart_state.unwrap_or_default();
        let (tx, rx) = mpsc::unbounded_channel();
        let termination = TerminationHandle::new(tx, Arc::clone(&restart_state), bus.clone());

        Kernel {
            id: self.id,
            artifact: self.artifact,
            bus,
            artifacts,
            services,
            servers: defaults.into_iter().map(ManagedServer::new).collect(),
            status: Mutex::new(ServerState::Created),
            restart_state,
            termination,
            termination_rx: Mutex::new(Some(rx)),
        }
    }
}
