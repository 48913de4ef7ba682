//! Artifact manager: load, unload and look up artifacts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use bytes::Bytes;
use tracing::{debug, info, warn};

use kestrel_core::{Coordinate, KernelId};
use kestrel_events::{EventBus, EventMetadata, KestrelEvent};

use crate::archive;
use crate::context::ArtifactContext;
use crate::error::{ArtifactError, ArtifactResult, SourceError};
use crate::isolation::IsolationPolicy;
use crate::scope::{CompositeScope, DelegateScope, LoadingScope, LocalScope};
use crate::source::ArtifactSource;

const EVENT_SOURCE: &str = "artifact_manager";

/// Priority of an artifact's own symbols inside its composite.
pub const LOCAL_PRIORITY: i32 = 0;

/// Priority of the shared-scope delegate inside an artifact's composite.
pub const SHARED_PRIORITY: i32 = 1;

/// Told about unloads after the context is gone from the loaded set.
///
/// The same coordinate may already be loaded again by the time an observer
/// runs; observers act on the unloaded `context`, not on its coordinate.
pub trait ArtifactObserver: Send + Sync {
    /// `context` was unloaded.
    fn on_unload(&self, context: &ArtifactContext);
}

/// Owns the loaded artifacts of one kernel.
///
/// The shared composite is handed in at construction. Artifacts loaded with
/// [`IsolationPolicy::None`] add their local scope to it; every artifact
/// resolves through it after its own symbols.
pub struct ArtifactManager {
    kernel_id: KernelId,
    source: Arc<dyn ArtifactSource>,
    shared: Arc<CompositeScope>,
    bus: EventBus,
    loaded: RwLock<HashMap<Coordinate, Arc<ArtifactContext>>>,
    next_sequence: AtomicU64,
    observers: RwLock<Vec<Weak<dyn ArtifactObserver>>>,
}

impl std::fmt::Debug for ArtifactManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactManager")
            .field("kernel_id", &self.kernel_id)
            .field("source", &self.source.name())
            .field("loaded", &self.len())
            .finish_non_exhaustive()
    }
}

impl ArtifactManager {
    /// Create a manager.
    #[must_use]
    pub fn new(
        kernel_id: KernelId,
        source: Arc<dyn ArtifactSource>,
        shared: Arc<CompositeScope>,
        bus: EventBus,
    ) -> Self {
        Self {
            kernel_id,
            source,
            shared,
            bus,
            loaded: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to unload notifications. Dropped observers are pruned.
    pub fn add_observer(&self, observer: Weak<dyn ArtifactObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Load `coordinate` with the given isolation.
    ///
    /// # Errors
    ///
    /// - [`ArtifactError::DuplicateArtifact`] if already loaded
    /// - [`ArtifactError::Source`] if the source cannot supply it or its
    ///   resource cannot be read
    pub fn load(
        &self,
        coordinate: &Coordinate,
        isolation: IsolationPolicy,
    ) -> ArtifactResult<Arc<ArtifactContext>> {
        if self.contains(coordinate) {
            return Err(ArtifactError::DuplicateArtifact {
                coordinate: coordinate.clone(),
            });
        }

        let location = self.source.get(coordinate)?;
        let symbols = archive::read_symbols(&location)
            .map_err(|e| SourceError::transfer(coordinate, e))?;

        let scope_name = coordinate.to_string();
        let local = Arc::new(LocalScope::from_symbols(
            scope_name.clone(),
            LOCAL_PRIORITY,
            symbols,
        ));
        let composite = Arc::new(CompositeScope::new(scope_name, LOCAL_PRIORITY));
        composite.add(Arc::clone(&local) as Arc<dyn LoadingScope>);
        composite.add(Arc::new(DelegateScope::new(
            "shared",
            SHARED_PRIORITY,
            Arc::clone(&self.shared) as Arc<dyn LoadingScope>,
        )));

        let context = {
            let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
            if loaded.contains_key(coordinate) {
                return Err(ArtifactError::DuplicateArtifact {
                    coordinate: coordinate.clone(),
                });
            }
            let context = Arc::new(ArtifactContext::new(
                coordinate.clone(),
                location,
                composite,
                Arc::clone(&local),
                isolation,
                self.kernel_id,
                self.next_sequence.fetch_add(1, Ordering::Relaxed),
            ));
            if isolation.shares_scope() {
                self.shared.add(local);
            }
            loaded.insert(coordinate.clone(), Arc::clone(&context));
            context
        };

        info!(
            coordinate = %coordinate,
            isolation = %isolation,
            symbols = context.symbol_count(),
            location = %context.location().display(),
            "artifact loaded"
        );
        self.bus.publish(KestrelEvent::ArtifactLoaded {
            metadata: EventMetadata::new(EVENT_SOURCE),
            coordinate: coordinate.clone(),
            isolation: isolation.to_string(),
        });

        Ok(context)
    }

    /// Unload `coordinate`.
    ///
    /// The context leaves the loaded set and its scope leaves the shared
    /// composite before observers run, so a service registry observer
    /// cascades unregistration for it.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::ArtifactNotFound`] if it is not loaded.
    pub fn unload(&self, coordinate: &Coordinate) -> ArtifactResult<Arc<ArtifactContext>> {
        let context = {
            let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
            let context = loaded
                .remove(coordinate)
                .ok_or_else(|| ArtifactError::ArtifactNotFound {
                    coordinate: coordinate.clone(),
                })?;
            if context.isolation().shares_scope() {
                self.shared.remove(context.local_scope().name());
            }
            context
        };

        for observer in self.live_observers() {
            observer.on_unload(&context);
        }

        info!(coordinate = %coordinate, "artifact unloaded");
        self.bus.publish(KestrelEvent::ArtifactUnloaded {
            metadata: EventMetadata::new(EVENT_SOURCE),
            coordinate: coordinate.clone(),
        });

        Ok(context)
    }

    /// Unload everything, most recently loaded first. Returns the count.
    pub fn unload_all(&self) -> usize {
        let mut unloaded: usize = 0;
        for context in self.list_all().into_iter().rev() {
            match self.unload(context.coordinate()) {
                Ok(_) => unloaded = unloaded.saturating_add(1),
                Err(e) => {
                    debug!(coordinate = %context.coordinate(), error = %e, "already unloaded");
                },
            }
        }
        unloaded
    }

    /// The loaded context for `coordinate`.
    #[must_use]
    pub fn find(&self, coordinate: &Coordinate) -> Option<Arc<ArtifactContext>> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(coordinate)
            .cloned()
    }

    /// Whether `coordinate` is loaded.
    #[must_use]
    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(coordinate)
    }

    /// Snapshot of every loaded context, in load order.
    #[must_use]
    pub fn list_all(&self) -> Vec<Arc<ArtifactContext>> {
        let mut all: Vec<Arc<ArtifactContext>> = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|c| c.sequence());
        all
    }

    /// Number of loaded artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The kernel-wide shared composite.
    #[must_use]
    pub fn shared_scope(&self) -> &Arc<CompositeScope> {
        &self.shared
    }

    /// Resolve against the shared composite.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Option<Bytes> {
        self.shared.resolve(symbol)
    }

    /// Owning kernel.
    #[must_use]
    pub fn kernel_id(&self) -> KernelId {
        self.kernel_id
    }

    fn live_observers(&self) -> Vec<Arc<dyn ArtifactObserver>> {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|o| o.strong_count() > 0);
        if observers.len() < before {
            warn!(
                pruned = before.saturating_sub(observers.len()),
                "dropped artifact observers pruned"
            );
        }
        observers.iter().filter_map(Weak::upgrade).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use kestrel_events::FilterSubscriber;

    use super::*;
    use crate::source::MemorySource;

    struct Fixture {
        dir: tempfile::TempDir,
        source: Arc<MemorySource>,
        manager: ArtifactManager,
        bus: EventBus,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MemorySource::new());
        let bus = EventBus::new();
        let shared = Arc::new(CompositeScope::new("shared", 0));
        let manager = ArtifactManager::new(
            KernelId::new(),
            Arc::clone(&source) as Arc<dyn ArtifactSource>,
            shared,
            bus.clone(),
        );
        Fixture {
            dir,
            source,
            manager,
            bus,
        }
    }

    fn artifact(f: &Fixture, coordinate: &str, files: &[(&str, &str)]) -> Coordinate {
        let c = Coordinate::parse(coordinate).unwrap();
        let root = f.dir.path().join(coordinate.replace(':', "_"));
        std::fs::create_dir_all(&root).unwrap();
        for (name, body) in files {
            std::fs::write(root.join(name), body).unwrap();
        }
        f.source.insert(c.clone(), root);
        c
    }

    #[test]
    fn test_load_find_unload() {
        let f = fixture();
        let c = artifact(&f, "org.example:widgets:1.0", &[("Widget", "w")]);

        let ctx = f.manager.load(&c, IsolationPolicy::Full).unwrap();
        assert_eq!(ctx.coordinate(), &c);
        assert_eq!(ctx.symbol_count(), 1);
        assert_eq!(ctx.kernel_id(), f.manager.kernel_id());
        assert!(f.manager.contains(&c));
        assert_eq!(f.manager.find(&c).unwrap(), ctx);

        f.manager.unload(&c).unwrap();
        assert!(!f.manager.contains(&c));
        assert!(f.manager.is_empty());
    }

    #[test]
    fn test_duplicate_load_then_reload() {
        let f = fixture();
        let c = artifact(&f, "org.example:widgets:1.0", &[("Widget", "w")]);

        f.manager.load(&c, IsolationPolicy::Full).unwrap();
        assert!(matches!(
            f.manager.load(&c, IsolationPolicy::None),
            Err(ArtifactError::DuplicateArtifact { .. })
        ));
        assert_eq!(f.manager.len(), 1);

        f.manager.unload(&c).unwrap();
        assert!(f.manager.load(&c, IsolationPolicy::Full).is_ok());
    }

    #[test]
    fn test_unload_unknown_is_not_found() {
        let f = fixture();
        let c = Coordinate::parse("org.example:ghost:1.0").unwrap();
        assert!(matches!(
            f.manager.unload(&c),
            Err(ArtifactError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn test_source_failure_propagates() {
        let f = fixture();
        let c = Coordinate::parse("org.example:missing:1.0").unwrap();
        assert!(matches!(
            f.manager.load(&c, IsolationPolicy::Full),
            Err(ArtifactError::Source(SourceError::ResourceUnavailable { .. }))
        ));
        assert!(!f.manager.contains(&c));
    }

    #[test]
    fn test_unreadable_resource_is_transfer_failure() {
        let f = fixture();
        let c = Coordinate::parse("org.example:broken:1.0").unwrap();
        f.source.insert(c.clone(), f.dir.path().join("does-not-exist"));
        assert!(matches!(
            f.manager.load(&c, IsolationPolicy::Full),
            Err(ArtifactError::Source(SourceError::TransferFailed { .. }))
        ));
    }

    #[test]
    fn test_isolation_controls_shared_visibility() {
        let f = fixture();
        let open = artifact(&f, "org.example:open:1.0", &[("Open", "o")]);
        let closed = artifact(&f, "org.example:closed:1.0", &[("Closed", "c")]);
        let partial = artifact(&f, "org.example:partial:1.0", &[("Partial", "p")]);

        let open_ctx = f.manager.load(&open, IsolationPolicy::None).unwrap();
        let closed_ctx = f.manager.load(&closed, IsolationPolicy::Full).unwrap();
        f.manager.load(&partial, IsolationPolicy::Partial).unwrap();

        assert!(f.manager.resolve("Open").is_some());
        assert!(f.manager.resolve("Closed").is_none());
        assert!(f.manager.resolve("Partial").is_none());

        // A fully isolated artifact still sees shared symbols.
        assert!(closed_ctx.resolve("Open").is_some());
        assert!(closed_ctx.resolve("Closed").is_some());
        assert!(open_ctx.resolve("Closed").is_none());

        f.manager.unload(&open).unwrap();
        assert!(f.manager.resolve("Open").is_none());
        assert!(closed_ctx.resolve("Open").is_none());
    }

    #[test]
    fn test_contexts_do_not_alias() {
        let f = fixture();
        let a = artifact(&f, "org.example:a:1.0", &[("S", "a")]);
        let b = artifact(&f, "org.example:b:1.0", &[("S", "b")]);

        let ctx_a = f.manager.load(&a, IsolationPolicy::Full).unwrap();
        let ctx_b = f.manager.load(&b, IsolationPolicy::Full).unwrap();

        assert_ne!(ctx_a, ctx_b);
        assert!(!Arc::ptr_eq(ctx_a.scope(), ctx_b.scope()));
        assert_eq!(ctx_a.resolve("S"), Some(Bytes::from_static(b"a")));
        assert_eq!(ctx_b.resolve("S"), Some(Bytes::from_static(b"b")));
    }

    #[test]
    fn test_unload_all_reverse_order() {
        let f = fixture();
        let coords: Vec<Coordinate> = [
            "org.example:a:1.0",
            "org.example:b:1.0",
            "org.example:c:1.0",
        ]
        .iter()
        .map(|c| artifact(&f, c, &[("x", "x")]))
        .collect();
        for c in &coords {
            f.manager.load(c, IsolationPolicy::None).unwrap();
        }
        assert_eq!(
            f.manager
                .list_all()
                .iter()
                .map(|c| c.coordinate().clone())
                .collect::<Vec<_>>(),
            coords
        );

        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        f.bus.subscribe_sync(Arc::new(FilterSubscriber::new("order", move |event| {
            if let KestrelEvent::ArtifactUnloaded { coordinate, .. } = event {
                sink.lock().unwrap().push(coordinate.clone());
            }
        })));

        assert_eq!(f.manager.unload_all(), 3);
        let expected: Vec<Coordinate> = coords.into_iter().rev().collect();
        assert_eq!(*order.lock().unwrap(), expected);
        assert!(f.manager.shared_scope().is_empty());
    }

    #[test]
    fn test_observer_sees_unload_after_removal() {
        struct Probe {
            manager_saw_loaded: Mutex<Vec<bool>>,
            manager: Weak<ArtifactManager>,
        }
        impl ArtifactObserver for Probe {
            fn on_unload(&self, context: &ArtifactContext) {
                let loaded = self
                    .manager
                    .upgrade()
                    .is_some_and(|m| m.contains(context.coordinate()));
                self.manager_saw_loaded.lock().unwrap().push(loaded);
            }
        }

        let f = fixture();
        let c = artifact(&f, "org.example:a:1.0", &[("x", "x")]);
        let manager = Arc::new(f.manager);
        let probe = Arc::new(Probe {
            manager_saw_loaded: Mutex::new(Vec::new()),
            manager: Arc::downgrade(&manager),
        });
        let weak = Arc::downgrade(&probe);
        manager.add_observer(weak);

        manager.load(&c, IsolationPolicy::Full).unwrap();
        manager.unload(&c).unwrap();
        assert_eq!(*probe.manager_saw_loaded.lock().unwrap(), vec![false]);
    }
}
