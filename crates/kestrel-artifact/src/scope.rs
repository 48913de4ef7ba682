//! Loading scopes.
//!
//! A scope answers whether it can supply the bytes of a named symbol. Scopes
//! chain: a [`CompositeScope`] asks its children in priority order and
//! returns the first answer, and a [`DelegateScope`] forwards to another
//! scope, typically the kernel-wide shared composite.
//!
//! Only `priority` and `enabled` change after construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use bytes::Bytes;
use tracing::debug;

/// A named, prioritised symbol resolver.
pub trait LoadingScope: Send + Sync {
    /// Scope name, unique within a composite.
    fn name(&self) -> &str;

    /// Lower values resolve first.
    fn priority(&self) -> i32;

    /// Change the priority. Composites re-sort only through
    /// [`CompositeScope::reprioritize`].
    fn set_priority(&self, priority: i32);

    /// Disabled scopes are skipped by composites.
    fn is_enabled(&self) -> bool;

    /// Enable or disable the scope.
    fn set_enabled(&self, enabled: bool);

    /// Bytes of `symbol`, if this scope supplies it.
    fn resolve(&self, symbol: &str) -> Option<Bytes>;
}

impl fmt::Debug for dyn LoadingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingScope")
            .field("name", &self.name())
            .field("priority", &self.priority())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Name, priority and enable flag shared by every scope kind.
#[derive(Debug)]
struct ScopeMeta {
    name: String,
    priority: AtomicI32,
    enabled: AtomicBool,
}

impl ScopeMeta {
    fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority: AtomicI32::new(priority),
            enabled: AtomicBool::new(true),
        }
    }

    fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Release);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

macro_rules! delegate_meta {
    () => {
        fn name(&self) -> &str {
            &self.meta.name
        }

        fn priority(&self) -> i32 {
            self.meta.priority()
        }

        fn set_priority(&self, priority: i32) {
            self.meta.set_priority(priority);
        }

        fn is_enabled(&self) -> bool {
            self.meta.is_enabled()
        }

        fn set_enabled(&self, enabled: bool) {
            self.meta.set_enabled(enabled);
        }
    };
}

/// Symbols read from one artifact's resource.
#[derive(Debug)]
pub struct LocalScope {
    meta: ScopeMeta,
    symbols: HashMap<String, Bytes>,
}

impl LocalScope {
    /// Create an empty scope.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self::from_symbols(name, priority, HashMap::new())
    }

    /// Create a scope over an existing symbol table.
    #[must_use]
    pub fn from_symbols(
        name: impl Into<String>,
        priority: i32,
        symbols: HashMap<String, Bytes>,
    ) -> Self {
        Self {
            meta: ScopeMeta::new(name, priority),
            symbols,
        }
    }

    /// Builder-style symbol insertion, used before the scope is shared.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.symbols.insert(symbol.into(), bytes.into());
        self
    }

    /// Number of symbols.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Symbol names, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl LoadingScope for LocalScope {
    delegate_meta!();

    fn resolve(&self, symbol: &str) -> Option<Bytes> {
        if !self.is_enabled() {
            return None;
        }
        self.symbols.get(symbol).cloned()
    }
}

/// Forwards every lookup to a parent scope.
pub struct DelegateScope {
    meta: ScopeMeta,
    target: Arc<dyn LoadingScope>,
}

impl DelegateScope {
    /// Delegate to `target`.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i32, target: Arc<dyn LoadingScope>) -> Self {
        Self {
            meta: ScopeMeta::new(name, priority),
            target,
        }
    }

    /// The scope lookups are forwarded to.
    #[must_use]
    pub fn target(&self) -> &Arc<dyn LoadingScope> {
        &self.target
    }
}

impl fmt::Debug for DelegateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateScope")
            .field("meta", &self.meta)
            .field("target", &self.target.name())
            .finish()
    }
}

impl LoadingScope for DelegateScope {
    delegate_meta!();

    fn resolve(&self, symbol: &str) -> Option<Bytes> {
        if !self.is_enabled() {
            return None;
        }
        self.target.resolve(symbol)
    }
}

type Children = Vec<Arc<dyn LoadingScope>>;

/// Ordered aggregate of scopes with first-match resolution.
///
/// Children are kept sorted by priority; ties keep insertion order. Lookups
/// read an `ArcSwap` snapshot without locking. Mutations build a new vector
/// under `write_lock` and publish it with a single store.
pub struct CompositeScope {
    meta: ScopeMeta,
    children: ArcSwap<Children>,
    write_lock: Mutex<()>,
}

impl CompositeScope {
    /// Create an empty composite.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            meta: ScopeMeta::new(name, priority),
            children: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Insert `scope` after every child with lower or equal priority.
    pub fn add(&self, scope: Arc<dyn LoadingScope>) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next: Children = (*self.children.load_full()).clone();
        insert_sorted(&mut next, scope);
        self.children.store(Arc::new(next));
    }

    /// Remove the first child named `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn LoadingScope>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next: Children = (*self.children.load_full()).clone();
        let index = next.iter().position(|c| c.name() == name)?;
        let removed = next.remove(index);
        self.children.store(Arc::new(next));
        debug!(composite = %self.meta.name, scope = name, "scope removed");
        Some(removed)
    }

    /// Change a child's priority and move it to its new place.
    ///
    /// The child lands after every other child of lower or equal priority.
    /// Returns `false` if no child has that name.
    pub fn reprioritize(&self, name: &str, priority: i32) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next: Children = (*self.children.load_full()).clone();
        let Some(index) = next.iter().position(|c| c.name() == name) else {
            return false;
        };
        let child = next.remove(index);
        child.set_priority(priority);
        insert_sorted(&mut next, child);
        self.children.store(Arc::new(next));
        true
    }

    /// Snapshot of the children in resolution order.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<dyn LoadingScope>> {
        (*self.children.load_full()).clone()
    }

    /// Child by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<Arc<dyn LoadingScope>> {
        self.children.load().iter().find(|c| c.name() == name).cloned()
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.load().len()
    }

    /// Whether there are no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.load().is_empty()
    }
}

fn insert_sorted(children: &mut Children, scope: Arc<dyn LoadingScope>) {
    let priority = scope.priority();
    let at = children
        .iter()
        .position(|c| c.priority() > priority)
        .unwrap_or(children.len());
    children.insert(at, scope);
}

impl fmt::Debug for CompositeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .children
            .load()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        f.debug_struct("CompositeScope")
            .field("meta", &self.meta)
            .field("children", &names)
            .finish()
    }
}

impl LoadingScope for CompositeScope {
    delegate_meta!();

    fn resolve(&self, symbol: &str) -> Option<Bytes> {
        if !self.is_enabled() {
            return None;
        }
        let snapshot = self.children.load();
        snapshot
            .iter()
            .filter(|child| child.is_enabled())
            .find_map(|child| child.resolve(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, priority: i32, symbol: &str, value: &'static str) -> Arc<LocalScope> {
        Arc::new(LocalScope::new(name, priority).with_symbol(symbol, value))
    }

    fn names(composite: &CompositeScope) -> Vec<String> {
        composite
            .children()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    #[test]
    fn test_local_scope_resolves_own_symbols() {
        let scope = LocalScope::new("a", 0)
            .with_symbol("x.class", "x")
            .with_symbol("y.class", "y");
        assert_eq!(scope.resolve("x.class"), Some(Bytes::from_static(b"x")));
        assert!(scope.resolve("z.class").is_none());
        assert_eq!(scope.symbol_count(), 2);
        assert_eq!(scope.symbols(), vec!["x.class", "y.class"]);
    }

    #[test]
    fn test_first_match_by_priority() {
        let composite = CompositeScope::new("c", 0);
        composite.add(local("late", 5, "s", "late"));
        composite.add(local("early", 1, "s", "early"));

        assert_eq!(composite.resolve("s"), Some(Bytes::from_static(b"early")));
        assert_eq!(names(&composite), vec!["early", "late"]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let composite = CompositeScope::new("c", 0);
        composite.add(local("first", 1, "s", "first"));
        composite.add(local("second", 1, "s", "second"));
        composite.add(local("zero", 0, "t", "zero"));

        assert_eq!(names(&composite), vec!["zero", "first", "second"]);
        assert_eq!(composite.resolve("s"), Some(Bytes::from_static(b"first")));
    }

    #[test]
    fn test_disabled_child_is_skipped() {
        let composite = CompositeScope::new("c", 0);
        let first = local("first", 0, "s", "first");
        composite.add(first.clone());
        composite.add(local("second", 1, "s", "second"));

        first.set_enabled(false);
        assert_eq!(composite.resolve("s"), Some(Bytes::from_static(b"second")));

        first.set_enabled(true);
        assert_eq!(composite.resolve("s"), Some(Bytes::from_static(b"first")));
    }

    #[test]
    fn test_disabling_only_provider_makes_symbol_absent() {
        let composite = CompositeScope::new("c", 0);
        let only = local("only", 0, "s", "v");
        composite.add(only.clone());
        only.set_enabled(false);
        assert!(composite.resolve("s").is_none());
    }

    #[test]
    fn test_remove_and_reprioritize() {
        let composite = CompositeScope::new("c", 0);
        composite.add(local("a", 0, "s", "a"));
        composite.add(local("b", 1, "s", "b"));
        composite.add(local("c", 2, "s", "c"));

        assert!(composite.reprioritize("a", 1));
        assert_eq!(names(&composite), vec!["b", "a", "c"]);
        assert_eq!(composite.resolve("s"), Some(Bytes::from_static(b"b")));
        assert!(!composite.reprioritize("missing", 0));

        let removed = composite.remove("b").unwrap();
        assert_eq!(removed.name(), "b");
        assert_eq!(composite.len(), 2);
        assert_eq!(composite.resolve("s"), Some(Bytes::from_static(b"a")));
        assert!(composite.remove("b").is_none());
    }

    #[test]
    fn test_delegate_forwards_to_target() {
        let shared = Arc::new(CompositeScope::new("shared", 0));
        shared.add(local("system", 0, "sys", "kernel"));

        let own = CompositeScope::new("own", 0);
        own.add(local("local", 0, "mine", "mine"));
        own.add(Arc::new(DelegateScope::new("parent", 1, shared.clone())));

        assert_eq!(own.resolve("mine"), Some(Bytes::from_static(b"mine")));
        assert_eq!(own.resolve("sys"), Some(Bytes::from_static(b"kernel")));

        shared.set_enabled(false);
        assert!(own.resolve("sys").is_none());
    }

    #[test]
    fn test_snapshot_is_stable_across_mutation() {
        let composite = CompositeScope::new("c", 0);
        composite.add(local("a", 0, "s", "a"));
        let snapshot = composite.children();
        composite.remove("a");

        assert_eq!(snapshot.len(), 1);
        assert!(composite.is_empty());
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        let composite = Arc::new(CompositeScope::new("c", 0));
        composite.add(local("base", 0, "s", "base"));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let composite = Arc::clone(&composite);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(composite.resolve("s"), Some(Bytes::from_static(b"base")));
                    }
                })
            })
            .collect();

        for i in 0..100 {
            let name = format!("extra-{i}");
            composite.add(local(&name, 1, "s", "extra"));
            composite.remove(&name);
        }
        for r in readers {
            r.join().unwrap();
        }
    }
}
