//! Loading, isolation and unloading through a running kernel.

mod common;

use std::sync::Arc;

use kestrel_artifact::{ArtifactError, IsolationPolicy, SourceError};
use kestrel_core::Coordinate;
use kestrel_events::KestrelEvent;
use kestrel_kernel::KernelError;

use common::World;

#[test]
fn test_distinct_coordinates_never_alias() {
    let world = World::new();
    let a = world.load(&world.widgets, IsolationPolicy::Full);
    let b = world.load(&world.gadgets, IsolationPolicy::Full);

    let found_a = world.kernel.artifacts().find(&world.widgets).unwrap();
    let found_b = world.kernel.artifacts().find(&world.gadgets).unwrap();
    assert!(Arc::ptr_eq(&a, &found_a));
    assert!(Arc::ptr_eq(&b, &found_b));
    assert!(!Arc::ptr_eq(&found_a, &found_b));
    assert!(!Arc::ptr_eq(found_a.scope(), found_b.scope()));
    assert_eq!(found_a.kernel_id(), world.kernel.id());
}

#[test]
fn test_duplicate_load_then_fresh_reload() {
    let world = World::new();
    let first = world.load(&world.widgets, IsolationPolicy::Full);

    assert!(matches!(
        world.kernel.load(&world.widgets, IsolationPolicy::Full),
        Err(KernelError::Artifact(ArtifactError::DuplicateArtifact { .. }))
    ));

    world.kernel.unload(&world.widgets).unwrap();
    let second = world.load(&world.widgets, IsolationPolicy::Full);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(
        second.resolve("org/example/Widget").as_deref(),
        Some(&b"widget"[..])
    );
}

#[test]
fn test_full_and_none_isolation() {
    let world = World::new();
    let a = world.load(&world.widgets, IsolationPolicy::Full);
    let b = world.load(&world.gadgets, IsolationPolicy::None);

    // A's own symbol is invisible from B.
    assert!(b.resolve("org/example/Widget").is_none());
    // B's symbol reaches A through the shared scope.
    assert_eq!(
        a.resolve("org/example/Gadget").as_deref(),
        Some(&b"gadget"[..])
    );
    // Local scope wins over shared.
    assert_eq!(
        a.resolve("shared/Common").as_deref(),
        Some(&b"from-widgets"[..])
    );
}

#[test]
fn test_unload_withdraws_shared_symbols() {
    let world = World::new();
    let a = world.load(&world.widgets, IsolationPolicy::Full);
    world.load(&world.gadgets, IsolationPolicy::None);
    assert!(a.resolve("org/example/Gadget").is_some());

    world.kernel.unload(&world.gadgets).unwrap();
    assert!(a.resolve("org/example/Gadget").is_none());
}

#[test]
fn test_archive_is_cached_on_first_load() {
    let world = World::new();
    let context = world.load(&world.gadgets, IsolationPolicy::Full);

    assert!(context.location().starts_with(world.fixture.cache()));
    let cached = world
        .fixture
        .cache()
        .join(world.gadgets.archive_path().unwrap());
    assert!(cached.is_file());
}

#[test]
fn test_missing_artifact_is_resource_unavailable() {
    let world = World::new();
    let missing = Coordinate::parse("org.example:missing:9.9").unwrap();
    assert!(matches!(
        world.kernel.load(&missing, IsolationPolicy::Full),
        Err(KernelError::Artifact(ArtifactError::Source(
            SourceError::ResourceUnavailable { .. }
        )))
    ));
    assert!(world.kernel.artifacts().is_empty());
}

#[test]
fn test_load_and_unload_events() {
    let world = World::new();
    world.kernel.events().clear();
    world.load(&world.widgets, IsolationPolicy::None);
    world.kernel.unload(&world.widgets).unwrap();

    let events = world.kernel.events().matching(|e| e.coordinate().is_some());
    assert!(matches!(
        &events[0],
        KestrelEvent::ArtifactLoaded { isolation, .. } if isolation == "none"
    ));
    assert!(matches!(&events[1], KestrelEvent::ArtifactUnloaded { .. }));
}

#[test]
fn test_stop_unloads_everything() {
    let world = World::new();
    world.load(&world.widgets, IsolationPolicy::Full);
    world.load(&world.gadgets, IsolationPolicy::None);

    world.kernel.stop(None);
    assert!(world.kernel.artifacts().is_empty());
    assert!(world.kernel.shared_scope().child("org.example:gadgets:2.1").is_none());
}

#[test]
fn test_canonical_paths() {
    let c = Coordinate::new("org.example", "widgets", "1.0").unwrap();
    assert_eq!(c.path(), "org/example/widgets/1.0/");
    assert_eq!(
        c.metadata_path(),
        "org/example/widgets/kestrel-metadata.toml"
    );
}
