//! Passthrough operations trait.
//!
//! The subset of host filesystem calls the versioning core relies on. Every
//! other callback of the hosting VFS is forwarded to the OS unchanged and
//! never reaches this layer.

use std::path::Path;

use super::types::{DirEntry, FileAttr};
use super::VfsResult;

/// Directory and file primitives used by the snapshot allocator and registry.
///
/// Paths are always relative to the backend's root. Calls are blocking and
/// may be issued concurrently from many threads.
pub trait PassthroughOps: Send + Sync {
    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool {
        self.getattr(path).is_ok()
    }

    /// Create a single directory with the given mode.
    ///
    /// Must be atomic and non-recursive: exactly one of several racing
    /// callers succeeds, the rest get [`VfsError::AlreadyExists`]. The same
    /// error is returned when the path exists as any other kind of entry.
    ///
    /// [`VfsError::AlreadyExists`]: super::VfsError::AlreadyExists
    fn create_dir(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &Path) -> VfsResult<()>;

    /// Remove a regular file.
    fn remove_file(&self, path: &Path) -> VfsResult<()>;

    /// Change permission bits.
    fn set_mode(&self, path: &Path, mode: u32) -> VfsResult<()>;

    /// Get attributes without following symlinks.
    fn getattr(&self, path: &Path) -> VfsResult<FileAttr>;

    /// List a directory, sorted by name.
    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Replace a file's contents, creating it if needed.
    fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()>;

    /// Read a whole file.
    fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>>;
}
