//! Local filesystem backend.
//!
//! Forwards to the host filesystem under a root directory, with path
//! security to prevent escaping it.

use std::fs;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::PassthroughOps;
use crate::vfs::types::{DirEntry, FileAttr, FileType};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/srv/studentfs`, then `create_dir("notes/2")` creates
/// `/srv/studentfs/notes/2`.
///
/// Path security is enforced: attempts to escape via `..` are blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path to an absolute path within the root.
    ///
    /// The final component is never followed, so a dangling or existing
    /// leaf is reported by the operation itself rather than here.
    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        let path = path.strip_prefix("/").unwrap_or(path);

        if path.as_os_str().is_empty() {
            return Ok(self.root.clone());
        }

        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(VfsError::path_escapes_root(path.display().to_string()));
        }

        let full = self.root.join(path);
        let parent = full
            .parent()
            .ok_or_else(|| VfsError::invalid_path("no parent"))?;
        let filename = full
            .file_name()
            .ok_or_else(|| VfsError::invalid_path("no filename"))?;

        // Symlinked parents may still point outside the root.
        let resolved = match dunce::canonicalize(parent) {
            Ok(canonical_parent) => canonical_parent.join(filename),
            // Parent doesn't exist, will fail on actual operation
            Err(_) => full,
        };

        if !resolved.starts_with(&self.root) {
            return Err(VfsError::path_escapes_root(format!(
                "{} is not under {}",
                resolved.display(),
                self.root.display()
            )));
        }

        Ok(resolved)
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            kind,
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        }
    }
}

impl PassthroughOps for LocalBackend {
    fn create_dir(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let full_path = self.resolve(path)?;

        // mkdir(2) is the atomic claim; EEXIST comes back as AlreadyExists.
        fs::DirBuilder::new()
            .mode(mode)
            .recursive(false)
            .create(&full_path)
            .map_err(VfsError::from)?;

        // The process umask may have masked bits off.
        fs::set_permissions(&full_path, fs::Permissions::from_mode(mode)).map_err(VfsError::from)
    }

    fn remove_dir(&self, path: &Path) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        fs::remove_dir(&full_path).map_err(VfsError::from)
    }

    fn remove_file(&self, path: &Path) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        fs::remove_file(&full_path).map_err(VfsError::from)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        fs::set_permissions(&full_path, fs::Permissions::from_mode(mode)).map_err(VfsError::from)
    }

    fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        let full_path = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full_path).map_err(VfsError::from)?;
        Ok(Self::metadata_to_attr(&meta))
    }

    fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let full_path = self.resolve(path)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&full_path).map_err(VfsError::from)? {
            let entry = entry.map_err(VfsError::from)?;
            let file_type = entry.file_type().map_err(VfsError::from)?;
            let kind = if file_type.is_dir() {
                FileType::Directory
            } else if file_type.is_symlink() {
                FileType::Symlink
            } else {
                FileType::File
            };

            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn write_all(&self, path: &Path, data: &[u8]) -> VfsResult<()> {
        let full_path = self.resolve(path)?;
        fs::write(&full_path, data).map_err(VfsError::from)
    }

    fn read_all(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let full_path = self.resolve(path)?;
        fs::read(&full_path).map_err(VfsError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (backend, dir)
    }

    #[test]
    fn test_create_dir_is_exclusive() {
        let (backend, dir) = setup();

        backend.create_dir(Path::new("doc"), 0o755).unwrap();
        let err = backend.create_dir(Path::new("doc"), 0o755).unwrap_err();
        assert!(err.is_already_exists());
        assert!(dir.path().join("doc").is_dir());
    }

    #[test]
    fn test_create_dir_over_file_reports_exists() {
        let (backend, dir) = setup();
        std::fs::write(dir.path().join("doc"), b"x").unwrap();

        let err = backend.create_dir(Path::new("doc"), 0o755).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_create_dir_is_not_recursive() {
        let (backend, _dir) = setup();

        let err = backend.create_dir(Path::new("missing/1"), 0o755).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[test]
    fn test_create_dir_applies_mode() {
        let (backend, _dir) = setup();

        backend.create_dir(Path::new("doc"), 0o755).unwrap();
        assert_eq!(backend.getattr(Path::new("doc")).unwrap().perm, 0o755);

        backend.set_mode(Path::new("doc"), 0o700).unwrap();
        assert_eq!(backend.getattr(Path::new("doc")).unwrap().perm, 0o700);
    }

    #[test]
    fn test_write_read_and_readdir() {
        let (backend, _dir) = setup();

        backend.create_dir(Path::new("doc"), 0o755).unwrap();
        backend.create_dir(Path::new("doc/1"), 0o755).unwrap();
        backend.write_all(Path::new("doc/1/doc"), b"hello world").unwrap();

        assert_eq!(backend.read_all(Path::new("doc/1/doc")).unwrap(), b"hello world");
        assert_eq!(backend.getattr(Path::new("doc/1/doc")).unwrap().size, 11);

        let entries = backend.readdir(Path::new("doc")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "1");
        assert!(entries[0].kind.is_dir());
    }

    #[test]
    fn test_path_escape_blocked() {
        let (backend, _dir) = setup();

        let err = backend.read_all(Path::new("../../../etc/passwd")).unwrap_err();
        assert!(matches!(err, VfsError::PathEscapesRoot(_)));
        assert!(backend.create_dir(Path::new("../outside"), 0o755).is_err());
    }

    #[test]
    fn test_remove_dir_only_when_empty() {
        let (backend, dir) = setup();
        backend.create_dir(Path::new("doc"), 0o755).unwrap();
        backend.write_all(Path::new("doc/doc"), b"x").unwrap();

        let err = backend.remove_dir(Path::new("doc")).unwrap_err();
        assert!(matches!(err, VfsError::NotEmpty(_)));

        backend.remove_file(Path::new("doc/doc")).unwrap();
        backend.remove_dir(Path::new("doc")).unwrap();
        assert!(!dir.path().join("doc").exists());
    }

    #[test]
    fn test_exists() {
        let (backend, _dir) = setup();

        assert!(backend.exists(Path::new("")));
        assert!(!backend.exists(Path::new("doc")));
        backend.create_dir(Path::new("doc"), 0o755).unwrap();
        assert!(backend.exists(Path::new("/doc")));
    }
}
