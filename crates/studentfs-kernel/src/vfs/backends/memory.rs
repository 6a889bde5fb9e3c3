//! In-memory filesystem backend.
//!
//! Used for testing. All data is ephemeral. Directory creation is atomic
//! under the entry map's write lock, and failures can be injected to
//! exercise error paths that are awkward to provoke on a real disk.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::PassthroughOps;
use crate::vfs::types::{DirEntry, FileAttr};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn attr_mut(&mut self) -> &mut FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }
}

/// Injected failures and call accounting.
#[derive(Debug, Default)]
struct Faults {
    /// Fail every `create_dir` from this 1-based call number on.
    create_dir_from: Option<(usize, io::ErrorKind)>,
    write: Option<io::ErrorKind>,
    create_dir_calls: usize,
}

/// In-memory filesystem backend.
///
/// Thread-safe via internal `RwLock`. All data is lost when dropped.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<PathBuf, Entry>>,
    faults: Mutex<Faults>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(
            PathBuf::from(""),
            Entry::Directory {
                attr: FileAttr::directory(0o755),
            },
        );
        Self {
            entries: RwLock::new(entries),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Make every following `create_dir` fail with `kind`.
    pub fn fail_create_dir_with(&self, kind: io::ErrorKind) {
        self.fail_create_dir_after(0, kind);
    }

    /// Let `successes` more `create_dir` calls through, then fail with `kind`.
    pub fn fail_create_dir_after(&self, successes: usize, kind: io::ErrorKind) {
        if let Ok(mut faults) = self.faults.lock() {
            let from = faults.create_dir_calls + successes + 1;
            faults.create_dir_from = Some((from, kind));
        }
    }

    /// Make every following `write_all` fail with `kind`.
    pub fn fail_write_with(&self, kind: io::ErrorKind) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.write = Some(kind);
        }
    }

    /// Remove any injected failure.
    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.create_dir_from = None;
            faults.write = None;
        }
    }

    /// Number of `create_dir` calls seen so far, including failed ones.
    pub fn create_dir_calls(&self) -> usize {
        self.faults.lock().map(|f| f.create_dir_calls).unwrap_or(0)
    }

    fn read_entries(&self) -> VfsResult<RwLockReadGuard<'_, HashMap<PathBuf, Entry>>> {
        self.entries
            .read()
            .map_err(|_| VfsError::backend("entry map lock poisoned"))
    }

    fn write_entries(&self) -> VfsResult<RwLockWriteGuard<'_, HashMap<PathBuf, Entry>>> {
        self.entries
            .write()
            .map_err(|_| VfsError::backend("entry map lock poisoned"))
    }

    /// Normalize a path: remove leading `/`, resolve `.` and `..`.
    fn normalize(path: &Path) -> PathBuf {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    result.pop();
                }
                Component::Normal(s) => {
                    result.push(s);
                }
            }
        }
        result
    }

    /// Get the path string for error messages.
    fn path_str(path: &Path) -> String {
        path.display().to_string()
    }

    fn parent_of(path: &Path) -> PathBuf {
        path.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    fn check_parent_dir(entries: &HashMap<PathBuf, Entry>, path: &Path) -> VfsResult<()> {
        let parent = Self::parent_of(path);
        match entries.get(&parent) {
            Some(Entry::Directory { .. }) => Ok(()),
            Some(_) => Err(VfsError::not_a_directory(Self::path_str(&parent))),
            None => Err(VfsError::not_found(Self::path_str(&parent))),
        }
    }

    fn touch_parent(entries: &mut HashMap<PathBuf, Entry>, path: &Path) {
        if let Some(parent) = entries.get_mut(&Self::parent_of(path)) {
            parent.attr_mut().mtime = SystemTime::now();
        }
    }
}

impl PassthroughOps for MemoryBackend {
    fn create_dir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        {
            let mut faults = self
                .faults
                .lock()
                .map_err(|_| VfsError::backend("fault lock poisoned"))?;
            faults.create_dir_calls += 1;
            if let Some((from, kind)) = faults.create_dir_from {
                if faults.create_dir_calls >= from {
                    return Err(VfsError::from(io::Error::from(kind)));
                }
            }
        }

        let normalized = Self::normalize(path);
        let mut entries = self.write_entries()?;

        if entries.contains_key(&normalized) {
            return Err(VfsError::already_exists(Self::path_str(&normalized)));
        }
        Self::check_parent_dir(&entries, &normalized)?;

        entries.insert(
            normalized.clone(),
            Entry::Directory {
                attr: FileAttr::directory(mode),
            },
        );
        Self::touch_parent(&mut entries, &normalized);
        Ok(())
    }

    fn remove_dir(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.write_entries()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) if normalized.as_os_str().is_empty() => {
                return Err(VfsError::invalid_path("cannot remove the root"));
            }
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }
        if entries.keys().any(|p| {
            !p.as_os_str().is_empty() && p != &normalized && Self::parent_of(p) == normalized
        }) {
            return Err(VfsError::not_empty(Self::path_str(&normalized)));
        }

        entries.remove(&normalized);
        Self::touch_parent(&mut entries, &normalized);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.write_entries()?;

        match entries.get(&normalized) {
            Some(Entry::File { .. }) => {}
            Some(Entry::Directory { .. }) => {
                return Err(VfsError::is_a_directory(Self::path_str(&normalized)));
            }
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        entries.remove(&normalized);
        Self::touch_parent(&mut entries, &normalized);
        Ok(())
    }

    fn set_mode(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let normalized = Self::normalize(path);
        let mut entries = self.write_entries()?;

        let entry = entries
            .get_mut(&normalized)
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))?;
        entry.attr_mut().perm = mode & 0o7777;
        Ok(())
    }

    fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let normalized = Self::normalize(path);
        let entries = self.read_entries()?;

        entries
            .get(&normalized)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(Self::path_str(&normalized)))
    }

    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let normalized = Self::normalize(path);
        let entries = self.read_entries()?;

        match entries.get(&normalized) {
            Some(Entry::Directory { .. }) => {}
            Some(_) => return Err(VfsError::not_a_directory(Self::path_str(&normalized))),
            None => return Err(VfsError::not_found(Self::path_str(&normalized))),
        }

        let mut result: Vec<DirEntry> = entries
            .iter()
            .filter(|(p, _)| !p.as_os_str().is_empty() && Self::parent_of(p) == normalized)
            .filter_map(|(p, e)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry::new(name, e.attr().kind))
            })
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let injected = self
            .faults
            .lock()
            .map_err(|_| VfsError::backend("fault lock poisoned"))?
            .write;
        if let Some(kind) = injected {
            return Err(VfsError::from(io::Error::from(kind)));
        }

        let normalized = Self::normalize(path);
        let mut entries = self.write_entries()?;

        match entries.get_mut(&normalized) {
            Some(Entry::Directory { .. }) => {
                return Err(VfsError::is_a_directory(Self::path_str(&normalized)));
            }
            Some(Entry::File { data: existing, attr }) => {
                *existing = data.to_vec();
                attr.size = data.len() as u64;
                attr.mtime = SystemTime::now();
            }
            None => {
                Self::check_parent_dir(&entries, &normalized)?;
                entries.insert(
                    normalized.clone(),
                    Entry::File {
                        data: data.to_vec(),
                        attr: FileAttr::file(data.len() as u64, 0o644),
                    },
                );
            }
        }
        Self::touch_parent(&mut entries, &normalized);
        Ok(())
    }

    fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize(path);
        let entries = self.read_entries()?;

        match entries.get(&normalized) {
            Some(Entry::File { data, .. }) => Ok(data.clone()),
            Some(Entry::Directory { .. }) => {
                Err(VfsError::is_a_directory(Self::path_str(&normalized)))
            }
            None => Err(VfsError::not_found(Self::path_str(&normalized))),
        }
    }
}
