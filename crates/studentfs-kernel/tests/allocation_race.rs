//! Concurrent allocation against both passthrough backends.
//!
//! Every thread starts from the same base version and is released at the
//! same instant. The atomic mkdir must hand each of them a different
//! version, and every claimed directory must exist afterwards.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

use studentfs_kernel::{
    EntityRegistry, LocalBackend, MemoryBackend, PassthroughOps, SnapshotAllocator,
};
use studentfs_types::VersionString;

const THREADS: usize = 16;

fn v(s: &str) -> VersionString {
    VersionString::parse(s).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ============================================================================
// Allocator
// ============================================================================

fn race_allocator(fs: Arc<dyn PassthroughOps>) -> Vec<VersionString> {
    fs.create_dir(Path::new("doc"), 0o755).unwrap();
    fs.create_dir(Path::new("doc/1"), 0o755).unwrap();

    let allocator = Arc::new(SnapshotAllocator::new(fs.clone()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let allocator = allocator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                allocator.allocate_next(Path::new("doc"), &v("1")).unwrap()
            })
        })
        .collect();

    let allocations: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for a in &allocations {
        assert!(fs.getattr(&a.path).unwrap().is_dir(), "{} missing", a.version);
    }
    allocations.into_iter().map(|a| a.version).collect()
}

fn assert_distinct_chain(versions: Vec<VersionString>) {
    let unique: BTreeSet<_> = versions.iter().cloned().collect();
    assert_eq!(unique.len(), THREADS, "duplicate versions: {versions:?}");

    // Same base, same candidate sequence: the winners are its first THREADS entries.
    let mut expected = BTreeSet::new();
    let mut candidate = v("2");
    expected.insert(candidate.clone());
    candidate = v("1").derive_sub_branch();
    for _ in 1..THREADS {
        expected.insert(candidate.clone());
        candidate = candidate.deepen();
    }
    assert_eq!(unique, expected);
}

#[test]
fn race_on_memory_backend() {
    init_tracing();
    let versions = race_allocator(Arc::new(MemoryBackend::new()));
    assert_distinct_chain(versions);
}

#[test]
fn race_on_local_backend() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let versions = race_allocator(Arc::new(LocalBackend::new(dir.path())));
    assert_distinct_chain(versions);
}

// ============================================================================
// Registry
// ============================================================================

fn race_registry(fs: Arc<dyn PassthroughOps>) {
    let registry = Arc::new(EntityRegistry::new(fs));
    registry.create_entity("doc").unwrap();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                registry.commit("doc").unwrap().version
            })
        })
        .collect();

    let versions: BTreeSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(versions.len(), threads);

    let entity = registry.entity("doc").unwrap();
    assert_eq!(entity.snapshot_count(), threads + 1);
    assert!(versions.contains(entity.current_version()));
    for version in &versions {
        assert!(entity.contains(version));
    }
}

#[test]
fn registry_race_on_memory_backend() {
    init_tracing();
    race_registry(Arc::new(MemoryBackend::new()));
}

#[test]
fn registry_race_on_local_backend() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    race_registry(Arc::new(LocalBackend::new(dir.path())));
}
