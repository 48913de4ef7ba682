//! Service registry: `(coordinate, contract) → instance`.
//!
//! Every entry belongs to one load of an artifact. Unloading that load
//! removes its entries, one `Unregistered` event each, in registration
//! order; entries of a later load of the same coordinate are untouched.
//! Events are published after the registry lock is released, so a
//! subscriber may call back into the registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{debug, info};

use kestrel_core::Coordinate;
use kestrel_events::{EventBus, KestrelEvent, RegistrationState};

use crate::context::ArtifactContext;
use crate::error::{RegistryError, RegistryResult};
use crate::manager::{ArtifactManager, ArtifactObserver};

const EVENT_SOURCE: &str = "service_registry";

/// Type-erased service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

type Key = (Coordinate, String);

/// One registered service.
pub struct ServiceEntry {
    coordinate: Coordinate,
    contract: String,
    instance: ServiceInstance,
    generation: u64,
    sequence: u64,
}

impl ServiceEntry {
    /// Owning artifact.
    #[must_use]
    pub fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    /// Contract name.
    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// The type-erased instance.
    #[must_use]
    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// The instance as `T`, if it is one.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("coordinate", &self.coordinate)
            .field("contract", &self.contract)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// The kernel's service registry.
pub struct ServiceRegistry {
    artifacts: Arc<ArtifactManager>,
    bus: EventBus,
    entries: RwLock<HashMap<Key, Arc<ServiceEntry>>>,
    next_sequence: AtomicU64,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl ServiceRegistry {
    /// Create a registry and subscribe it to `artifacts` unloads.
    #[must_use]
    pub fn new(artifacts: Arc<ArtifactManager>, bus: EventBus) -> Arc<Self> {
        let registry = Arc::new(Self {
            artifacts: Arc::clone(&artifacts),
            bus,
            entries: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
        });
        let observer: Weak<Self> = Arc::downgrade(&registry);
        artifacts.add_observer(observer);
        registry
    }

    /// Register `instance` under `(coordinate, contract)`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotLoaded`] if the artifact is not loaded
    /// - [`RegistryError::AlreadyRegistered`] if the key is taken
    ///
    /// Entries left behind by an earlier load of `coordinate` whose unload
    /// cascade has not run yet are withdrawn first.
    pub fn register(
        &self,
        coordinate: &Coordinate,
        contract: impl Into<String>,
        instance: ServiceInstance,
    ) -> RegistryResult<Arc<ServiceEntry>> {
        let contract = contract.into();
        let (entry, stale) = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let Some(context) = self.artifacts.find(coordinate) else {
                return Err(RegistryError::NotLoaded {
                    coordinate: coordinate.clone(),
                });
            };
            let generation = context.sequence();
            let stale = drain_matching(&mut entries, |entry| {
                &entry.coordinate == coordinate && entry.generation != generation
            });
            let key = (coordinate.clone(), contract.clone());
            if entries.contains_key(&key) {
                drop(entries);
                self.publish_unregistered(coordinate, &stale);
                return Err(RegistryError::AlreadyRegistered {
                    coordinate: coordinate.clone(),
                    contract,
                });
            }
            let entry = Arc::new(ServiceEntry {
                coordinate: coordinate.clone(),
                contract: contract.clone(),
                instance,
                generation,
                sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            });
            entries.insert(key, Arc::clone(&entry));
            (entry, stale)
        };

        self.publish_unregistered(coordinate, &stale);
        info!(coordinate = %coordinate, contract = %contract, "service registered");
        self.publish(&entry, RegistrationState::Registered);
        Ok(entry)
    }

    /// Remove the entry under `(coordinate, contract)`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] if there is none.
    pub fn unregister(
        &self,
        coordinate: &Coordinate,
        contract: &str,
    ) -> RegistryResult<Arc<ServiceEntry>> {
        let key = (coordinate.clone(), contract.to_string());
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        let entry = removed.ok_or_else(|| RegistryError::NotRegistered {
            coordinate: coordinate.clone(),
            contract: contract.to_string(),
        })?;

        info!(coordinate = %coordinate, contract = %contract, "service unregistered");
        self.publish(&entry, RegistrationState::Unregistered);
        Ok(entry)
    }

    /// Earliest-registered provider of `contract`.
    #[must_use]
    pub fn find(&self, contract: &str) -> Option<Arc<ServiceEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.contract == contract)
            .min_by_key(|e| e.sequence)
            .cloned()
    }

    /// Earliest-registered provider of `contract`, downcast to `T`.
    #[must_use]
    pub fn find_typed<T: Any + Send + Sync>(&self, contract: &str) -> Option<Arc<T>> {
        self.find(contract).and_then(|e| e.downcast::<T>())
    }

    /// Every provider of `contract`, in registration order.
    #[must_use]
    pub fn find_all(&self, contract: &str) -> Vec<Arc<ServiceEntry>> {
        self.collect_sorted(|e| e.contract == contract)
    }

    /// Services registered by `coordinate`, in registration order.
    #[must_use]
    pub fn services_of(&self, coordinate: &Coordinate) -> Vec<Arc<ServiceEntry>> {
        self.collect_sorted(|e| &e.coordinate == coordinate)
    }

    /// Snapshot of every key, in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<(Coordinate, String)> {
        self.entries()
            .iter()
            .map(|e| (e.coordinate.clone(), e.contract.clone()))
            .collect()
    }

    /// Snapshot of every entry, in registration order.
    #[must_use]
    pub fn entries(&self) -> Vec<Arc<ServiceEntry>> {
        self.collect_sorted(|_| true)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove everything, publishing `Unregistered` for each entry in
    /// registration order. Returns the count.
    pub fn unregister_all(&self) -> usize {
        let drained = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let mut drained: Vec<Arc<ServiceEntry>> = entries.drain().map(|(_, e)| e).collect();
            drained.sort_by_key(|e| e.sequence);
            drained
        };
        for entry in &drained {
            self.publish(entry, RegistrationState::Unregistered);
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "all services unregistered");
        }
        drained.len()
    }

    fn publish_unregistered(&self, coordinate: &Coordinate, removed: &[Arc<ServiceEntry>]) {
        if removed.is_empty() {
            return;
        }
        debug!(coordinate = %coordinate, count = removed.len(), "cascading unregistration");
        for entry in removed {
            self.publish(entry, RegistrationState::Unregistered);
        }
    }

    fn collect_sorted(&self, keep: impl Fn(&ServiceEntry) -> bool) -> Vec<Arc<ServiceEntry>> {
        let mut out: Vec<Arc<ServiceEntry>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| keep(e))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.sequence);
        out
    }

    fn publish(&self, entry: &ServiceEntry, state: RegistrationState) {
        self.bus.publish(KestrelEvent::registry_change(
            EVENT_SOURCE,
            entry.coordinate.clone(),
            entry.contract.clone(),
            state,
        ));
    }
}

impl ArtifactObserver for ServiceRegistry {
    fn on_unload(&self, context: &ArtifactContext) {
        let coordinate = context.coordinate();
        let generation = context.sequence();
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            drain_matching(&mut entries, |entry| {
                &entry.coordinate == coordinate && entry.generation == generation
            })
        };
        self.publish_unregistered(coordinate, &removed);
    }
}

/// Remove the entries matching `pred`, returned in registration order.
fn drain_matching(
    entries: &mut HashMap<Key, Arc<ServiceEntry>>,
    pred: impl Fn(&ServiceEntry) -> bool,
) -> Vec<Arc<ServiceEntry>> {
    let mut removed = Vec::new();
    entries.retain(|_, entry| {
        if pred(entry.as_ref()) {
            removed.push(Arc::clone(entry));
            false
        } else {
            true
        }
    });
    removed.sort_by_key(|e| e.sequence);
    removed
}
