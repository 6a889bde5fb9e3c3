//! Entity registry.
//!
//! Holds one [`VersionedEntity`] record per entity directory under the
//! passthrough root and applies successful allocations to them. Records are
//! loaded lazily from disk: the directory tree is the only persisted state,
//! so a record can always be rebuilt by scanning.
//!
//! Allocation happens without holding the record lock; the atomic
//! `create_dir` inside the allocator is what serialises concurrent writers.
//! The lock only makes the record update (count, current version, content
//! ref) a single step.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use studentfs_types::{ContentRef, SnapshotDirectory, VersionString, VersionedEntity};

use crate::allocator::SnapshotAllocator;
use crate::config::StoreConfig;
use crate::error::{SnapshotError, SnapshotResult};
use crate::vfs::{PassthroughOps, VfsError};

type EntityHandle = Arc<RwLock<VersionedEntity>>;

/// Registry of versioned entities backed by a passthrough layer.
pub struct EntityRegistry {
    fs: Arc<dyn PassthroughOps>,
    allocator: SnapshotAllocator,
    initial_version: VersionString,
    entities: DashMap<String, EntityHandle>,
}

impl EntityRegistry {
    /// Registry with default layout (initial version `1`, mode `0o755`).
    pub fn new(fs: Arc<dyn PassthroughOps>) -> Self {
        Self {
            allocator: SnapshotAllocator::new(fs.clone()),
            fs,
            initial_version: VersionString::initial(),
            entities: DashMap::new(),
        }
    }

    /// Registry using the layout settings from `config`.
    ///
    /// `config.root` is not consulted; the caller roots `fs` there.
    pub fn with_config(fs: Arc<dyn PassthroughOps>, config: &StoreConfig) -> Self {
        Self {
            allocator: SnapshotAllocator::new(fs.clone()).with_dir_mode(config.dir_mode),
            fs,
            initial_version: config.initial_version.clone(),
            entities: DashMap::new(),
        }
    }

    /// Names of the entities currently loaded, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Entity directories present under the root, sorted.
    pub fn list_on_disk(&self) -> SnapshotResult<Vec<String>> {
        Ok(self
            .fs
            .readdir(Path::new(""))?
            .into_iter()
            .filter(|e| e.kind.is_dir())
            .map(|e| e.name)
            .collect())
    }

    /// Create a new entity with its initial snapshot.
    pub fn create_entity(&self, name: &str) -> SnapshotResult<VersionedEntity> {
        let dir = entity_dir(name)?;
        if self.entities.contains_key(name) {
            return Err(SnapshotError::EntityExists(name.to_string()));
        }

        let mode = self.allocator.dir_mode();
        self.fs.create_dir(&dir, mode).map_err(|e| {
            if e.is_already_exists() {
                SnapshotError::EntityExists(name.to_string())
            } else {
                SnapshotError::DirectoryCreate {
                    path: dir.clone(),
                    source: e,
                }
            }
        })?;

        let path = dir.join(self.initial_version.format());
        if let Err(source) = self.fs.create_dir(&path, mode) {
            // An entity directory without a snapshot is not an entity; take it back.
            if let Err(e) = self.fs.remove_dir(&dir) {
                tracing::warn!(entity = name, error = %e, "could not remove entity directory after failed create");
            }
            return Err(SnapshotError::DirectoryCreate { path, source });
        }

        let initial = SnapshotDirectory::new(self.initial_version.clone(), ContentRef::new(path))
            .with_mode(mode);
        let entity = VersionedEntity::new(name, initial);

        match self.entities.entry(name.to_string()) {
            Entry::Occupied(_) => Err(SnapshotError::EntityExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(entity.clone())));
                tracing::info!(entity = name, version = %self.initial_version, "created entity");
                Ok(entity)
            }
        }
    }

    /// Load an entity from disk, or return the already loaded record.
    pub fn open_entity(&self, name: &str) -> SnapshotResult<VersionedEntity> {
        Ok(self.handle(name)?.read().clone())
    }

    /// Rebuild the record from disk.
    ///
    /// A loaded record is replaced in place under its write lock, so callers
    /// already holding the entity see the rebuilt state. An entity whose
    /// directory has gone is dropped from the registry.
    pub fn reload_entity(&self, name: &str) -> SnapshotResult<VersionedEntity> {
        let Some(handle) = self.entities.get(name).map(|h| h.value().clone()) else {
            let entity = self.scan(name)?;
            self.entities
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(entity.clone())));
            return Ok(entity);
        };

        let mut record = handle.write();
        match self.scan(name) {
            Ok(entity) => {
                *record = entity.clone();
                Ok(entity)
            }
            Err(e @ SnapshotError::EntityNotFound(_)) => {
                drop(record);
                self.entities.remove(name);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Current record for an entity.
    pub fn entity(&self, name: &str) -> SnapshotResult<VersionedEntity> {
        self.open_entity(name)
    }

    /// Allocate the next snapshot after the entity's current version.
    pub fn commit(&self, name: &str) -> SnapshotResult<SnapshotDirectory> {
        self.commit_with_content(name, None, None)
    }

    /// Allocate the next snapshot after an explicit base version.
    pub fn commit_from(
        &self,
        name: &str,
        base: &VersionString,
    ) -> SnapshotResult<SnapshotDirectory> {
        self.commit_with_content(name, Some(base), None)
    }

    /// Allocate the next snapshot and store `content` in it before it is
    /// recorded.
    ///
    /// `base` defaults to the current version. If the content cannot be
    /// written the new directory is removed again and the record is left
    /// as it was.
    pub fn commit_with_content(
        &self,
        name: &str,
        base: Option<&VersionString>,
        content: Option<&[u8]>,
    ) -> SnapshotResult<SnapshotDirectory> {
        let dir = entity_dir(name)?;
        let handle = self.handle(name)?;
        let base = match base {
            Some(base) if handle.read().contains(base) => base.clone(),
            Some(base) => {
                return Err(SnapshotError::UnknownVersion {
                    entity: name.to_string(),
                    version: base.clone(),
                });
            }
            None => handle.read().current_version().clone(),
        };

        let allocation = self.allocator.allocate_next(&dir, &base)?;
        let own_size = match content {
            Some(data) => self.fill_snapshot(name, &allocation.path, data)?,
            None => 0,
        };

        let snapshot = SnapshotDirectory::new(allocation.version, ContentRef::new(allocation.path))
            .with_mode(self.allocator.dir_mode())
            .with_own_size(own_size);

        let mut record = handle.write();
        if record.contains(&snapshot.version) {
            // Already recorded: picked up by a reload scan, or deleted
            // outside the registry and claimed again. The new directory
            // backs that snapshot now.
            tracing::warn!(
                entity = name,
                version = %snapshot.version,
                path = %snapshot.content.path().display(),
                "allocated directory was already recorded"
            );
            record.set_current(&snapshot.version)?;
            record.set_own_size(&snapshot.version, own_size)?;
            return Ok(record
                .snapshot(&snapshot.version)
                .cloned()
                .unwrap_or(snapshot));
        }
        record.record_allocation(snapshot.clone())?;
        Ok(snapshot)
    }

    /// Write a new snapshot's content file, removing the snapshot directory
    /// again on failure.
    fn fill_snapshot(&self, name: &str, snapshot_dir: &Path, data: &[u8]) -> SnapshotResult<u64> {
        let file = snapshot_dir.join(name);
        let written = self
            .fs
            .write_all(&file, data)
            .map_err(SnapshotError::from)
            .and_then(|()| self.own_size(snapshot_dir));

        if written.is_err() {
            match self.fs.remove_file(&file) {
                Ok(()) | Err(VfsError::NotFound(_)) => {}
                Err(e) => tracing::warn!(path = %file.display(), error = %e, "could not remove partial content"),
            }
            if let Err(e) = self.fs.remove_dir(snapshot_dir) {
                tracing::warn!(path = %snapshot_dir.display(), error = %e, "orphaned snapshot directory");
            }
        }
        written
    }

    /// Store `data` as a snapshot's content and roll its size up the tree.
    pub fn write_content(
        &self,
        name: &str,
        version: &VersionString,
        data: &[u8],
    ) -> SnapshotResult<u64> {
        let handle = self.handle(name)?;
        let snapshot_dir = self.snapshot_dir(name, &handle, version)?;

        self.fs.write_all(&snapshot_dir.join(name), data)?;
        let size = self.own_size(&snapshot_dir)?;
        handle.write().set_own_size(version, size)?;

        tracing::debug!(entity = name, version = %version, size, "stored snapshot content");
        Ok(size)
    }

    /// Read a snapshot's content.
    pub fn read_content(&self, name: &str, version: &VersionString) -> SnapshotResult<Vec<u8>> {
        let handle = self.handle(name)?;
        let snapshot_dir = self.snapshot_dir(name, &handle, version)?;
        Ok(self.fs.read_all(&snapshot_dir.join(name))?)
    }

    fn snapshot_dir(
        &self,
        name: &str,
        handle: &EntityHandle,
        version: &VersionString,
    ) -> SnapshotResult<PathBuf> {
        let entity = handle.read();
        entity
            .snapshot(version)
            .map(|s| s.content.path().to_path_buf())
            .ok_or_else(|| SnapshotError::UnknownVersion {
                entity: name.to_string(),
                version: version.clone(),
            })
    }

    fn handle(&self, name: &str) -> SnapshotResult<EntityHandle> {
        if let Some(handle) = self.entities.get(name) {
            return Ok(handle.value().clone());
        }

        let entity = self.scan(name)?;
        // A concurrent loader may have won; keep its record.
        let handle = self
            .entities
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(entity)))
            .value()
            .clone();
        Ok(handle)
    }

    /// Rebuild an entity record from its directory.
    fn scan(&self, name: &str) -> SnapshotResult<VersionedEntity> {
        let dir = entity_dir(name)?;
        let not_found = || SnapshotError::EntityNotFound(name.to_string());

        match self.fs.getattr(&dir) {
            Ok(attr) if attr.is_dir() => {}
            Ok(_) | Err(VfsError::NotFound(_)) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        }

        let mut found: Vec<(SnapshotDirectory, SystemTime)> = Vec::new();
        for entry in self.fs.readdir(&dir)? {
            if !entry.kind.is_dir() {
                continue;
            }
            let Ok(version) = VersionString::parse(&entry.name) else {
                tracing::debug!(entity = name, entry = %entry.name, "skipping non-snapshot directory");
                continue;
            };

            let path = dir.join(&entry.name);
            let attr = self.fs.getattr(&path)?;
            let own_size = self.own_size(&path)?;
            let snapshot = SnapshotDirectory::new(version, ContentRef::new(path))
                .with_mode(attr.perm)
                .with_own_size(own_size);
            found.push((snapshot, attr.mtime));
        }

        let current = found
            .iter()
            .max_by(|(a, a_time), (b, b_time)| {
                a_time.cmp(b_time).then_with(|| a.version.cmp(&b.version))
            })
            .map(|(s, _)| s.version.clone())
            .ok_or_else(not_found)?;

        let entity =
            VersionedEntity::from_snapshots(name, found.into_iter().map(|(s, _)| s), &current)?;
        tracing::debug!(
            entity = name,
            snapshots = entity.snapshot_count(),
            current = %current,
            "loaded entity from disk"
        );
        Ok(entity)
    }

    /// Sum of regular-file sizes directly inside a snapshot directory.
    fn own_size(&self, snapshot_dir: &Path) -> SnapshotResult<u64> {
        let mut total = 0;
        for entry in self.fs.readdir(snapshot_dir)? {
            if entry.kind.is_file() {
                total += self.fs.getattr(&snapshot_dir.join(&entry.name))?.size;
            }
        }
        Ok(total)
    }
}

/// Entity names are single path components.
fn entity_dir(name: &str) -> SnapshotResult<PathBuf> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(SnapshotError::InvalidEntityName(name.to_string()));
    }
    Ok(PathBuf::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryBackend;
    use std::io;

    fn v(s: &str) -> VersionString {
        VersionString::parse(s).unwrap()
    }

    fn setup() -> (Arc<MemoryBackend>, EntityRegistry) {
        let fs = Arc::new(MemoryBackend::new());
        let registry = EntityRegistry::new(fs.clone());
        (fs, registry)
    }

    #[test]
    fn test_create_entity() {
        let (fs, registry) = setup();

        let entity = registry.create_entity("notes").unwrap();
        assert_eq!(entity.snapshot_count(), 1);
        assert_eq!(entity.current_version(), &v("1"));
        assert!(fs.getattr(Path::new("notes/1")).unwrap().is_dir());

        assert!(matches!(
            registry.create_entity("notes"),
            Err(SnapshotError::EntityExists(_))
        ));
    }

    #[test]
    fn test_invalid_names() {
        let (_fs, registry) = setup();
        for bad in ["", ".", "..", "a/b"] {
            assert!(matches!(
                registry.create_entity(bad),
                Err(SnapshotError::InvalidEntityName(_))
            ));
        }
    }

    #[test]
    fn test_commit_advances_trunk() {
        let (_fs, registry) = setup();
        registry.create_entity("notes").unwrap();

        let snap = registry.commit("notes").unwrap();
        assert_eq!(snap.version, v("2"));
        assert_eq!(snap.content.path(), Path::new("notes/2"));

        let entity = registry.entity("notes").unwrap();
        assert_eq!(entity.snapshot_count(), 2);
        assert_eq!(entity.current_version(), &v("2"));
        assert_eq!(entity.current_content().path(), Path::new("notes/2"));
    }

    #[test]
    fn test_commit_from_old_version_branches() {
        let (_fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        registry.commit("notes").unwrap();

        let snap = registry.commit_from("notes", &v("1")).unwrap();
        assert_eq!(snap.version, v("1.1"));

        let snap = registry.commit_from("notes", &v("1")).unwrap();
        assert_eq!(snap.version, v("1.0.1"));

        let snap = registry.commit("notes").unwrap();
        assert_eq!(snap.version, v("1.0.2"));

        let err = registry.commit_from("notes", &v("7")).unwrap_err();
        assert!(matches!(err, SnapshotError::UnknownVersion { .. }));
    }

    #[test]
    fn test_failed_allocation_leaves_record_untouched() {
        let (fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        registry.commit("notes").unwrap();
        let before = registry.entity("notes").unwrap();

        fs.fail_create_dir_with(io::ErrorKind::PermissionDenied);
        let err = registry.commit("notes").unwrap_err();
        assert!(matches!(err, SnapshotError::DirectoryCreate { .. }));

        let after = registry.entity("notes").unwrap();
        assert_eq!(after.snapshot_count(), before.snapshot_count());
        assert_eq!(after.current_version(), before.current_version());
        assert_eq!(after, before);
    }

    #[test]
    fn test_write_content_rolls_up() {
        let (_fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        registry.write_content("notes", &v("1"), b"first").unwrap();
        let second = registry.commit("notes").unwrap();
        registry
            .write_content("notes", &second.version, b"second draft")
            .unwrap();

        let entity = registry.entity("notes").unwrap();
        let root = entity.snapshot(&v("1")).unwrap();
        assert_eq!(root.own_size, 5);
        assert_eq!(root.subtree_size, 17);
        assert_eq!(root.child_count, 1);
        assert_eq!(
            registry.read_content("notes", &v("2")).unwrap(),
            b"second draft"
        );
    }

    #[test]
    fn test_open_rebuilds_from_disk() {
        let (fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        registry.write_content("notes", &v("1"), b"abc").unwrap();
        registry.commit("notes").unwrap();
        registry.commit_from("notes", &v("1")).unwrap();
        fs.create_dir(Path::new("notes/scratch"), 0o755).unwrap();

        let fresh = EntityRegistry::new(fs.clone());
        let entity = fresh.open_entity("notes").unwrap();
        assert_eq!(entity.snapshot_count(), 3);
        assert!(entity.contains(&v("1.1")));
        assert_eq!(entity.snapshot(&v("1")).unwrap().subtree_size, 3);
        assert_eq!(entity.snapshot(&v("1")).unwrap().child_count, 2);
    }

    #[test]
    fn test_open_missing_entity() {
        let (fs, registry) = setup();
        assert!(matches!(
            registry.open_entity("ghost"),
            Err(SnapshotError::EntityNotFound(_))
        ));

        fs.create_dir(Path::new("empty"), 0o755).unwrap();
        assert!(matches!(
            registry.open_entity("empty"),
            Err(SnapshotError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_list_on_disk() {
        let (fs, registry) = setup();
        registry.create_entity("b").unwrap();
        registry.create_entity("a").unwrap();
        fs.write_all(Path::new("stray.txt"), b"x").unwrap();

        assert_eq!(registry.list_on_disk().unwrap(), ["a", "b"]);
        assert_eq!(registry.loaded(), ["a", "b"]);
    }

    #[test]
    fn test_failed_initial_snapshot_rolls_back() {
        let (fs, registry) = setup();
        fs.fail_create_dir_after(1, io::ErrorKind::StorageFull);

        let err = registry.create_entity("notes").unwrap_err();
        match &err {
            SnapshotError::DirectoryCreate { path, source } => {
                assert_eq!(path, Path::new("notes/1"));
                assert!(matches!(source, VfsError::NoSpace));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!fs.exists(Path::new("notes")));
        assert!(registry.loaded().is_empty());

        fs.clear_faults();
        registry.create_entity("notes").unwrap();
        assert_eq!(registry.commit("notes").unwrap().version, v("2"));
    }

    #[test]
    fn test_reload_updates_held_handle() {
        let (fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        let held = registry.handle("notes").unwrap();

        fs.create_dir(Path::new("notes/7"), 0o755).unwrap();
        let entity = registry.reload_entity("notes").unwrap();
        assert!(entity.contains(&v("7")));
        assert_eq!(entity.current_version(), &v("7"));

        assert!(Arc::ptr_eq(&held, &registry.handle("notes").unwrap()));
        assert!(held.read().contains(&v("7")));

        assert_eq!(registry.commit("notes").unwrap().version, v("8"));
        assert_eq!(held.read().snapshot_count(), 3);
    }

    #[test]
    fn test_reload_drops_vanished_entity() {
        let (fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        fs.remove_dir(Path::new("notes/1")).unwrap();
        fs.remove_dir(Path::new("notes")).unwrap();

        assert!(matches!(
            registry.reload_entity("notes"),
            Err(SnapshotError::EntityNotFound(_))
        ));
        assert!(registry.loaded().is_empty());
    }

    #[test]
    fn test_content_written_before_record() {
        let (fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        let before = registry.entity("notes").unwrap();

        fs.fail_write_with(io::ErrorKind::PermissionDenied);
        let err = registry
            .commit_with_content("notes", None, Some(b"draft"))
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Vfs(VfsError::PermissionDenied(_))));
        assert!(!fs.exists(Path::new("notes/2")));
        assert_eq!(registry.entity("notes").unwrap(), before);

        fs.clear_faults();
        let snap = registry
            .commit_with_content("notes", Some(&v("1")), Some(b"draft"))
            .unwrap();
        assert_eq!(snap.version, v("2"));
        assert_eq!(snap.own_size, 5);

        let entity = registry.entity("notes").unwrap();
        assert_eq!(entity.snapshot(&v("1")).unwrap().subtree_size, 5);
        assert_eq!(registry.read_content("notes", &v("2")).unwrap(), b"draft");
    }

    #[test]
    fn test_recreated_directory_is_adopted() {
        let (fs, registry) = setup();
        registry.create_entity("notes").unwrap();
        registry.commit("notes").unwrap();
        registry.commit("notes").unwrap();

        // Deleted behind the registry's back, then claimed again.
        fs.remove_dir(Path::new("notes/2")).unwrap();
        let snap = registry.commit_from("notes", &v("1")).unwrap();
        assert_eq!(snap.version, v("2"));
        assert!(fs.exists(Path::new("notes/2")));

        let entity = registry.entity("notes").unwrap();
        assert_eq!(entity.snapshot_count(), 3);
        assert_eq!(entity.current_version(), &v("2"));
    }
}
