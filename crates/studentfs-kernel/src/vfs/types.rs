//! Entry kinds and attributes returned by the passthrough layer.
//!
//! Path-based, no inodes: the registry only needs kinds, sizes, modes and
//! modification times to rebuild entity records from disk.

use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    /// Reported, never followed.
    Symlink,
}

impl FileType {
    pub fn is_file(self) -> bool {
        self == FileType::File
    }

    pub fn is_dir(self) -> bool {
        self == FileType::Directory
    }
}

/// What `getattr` reports for one path.
#[derive(Debug, Clone)]
pub struct FileAttr {
    pub size: u64,
    pub kind: FileType,
    /// Permission bits only (`mode & 0o7777`).
    pub perm: u32,
    pub mtime: SystemTime,
}

impl FileAttr {
    /// Attributes of a regular file written just now.
    pub fn file(size: u64, perm: u32) -> Self {
        Self {
            size,
            kind: FileType::File,
            perm,
            mtime: SystemTime::now(),
        }
    }

    /// Attributes of a directory created just now.
    pub fn directory(perm: u32) -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            perm,
            mtime: SystemTime::now(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// One `readdir` result: a bare name relative to the listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: FileType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_kinds() {
        let file = FileAttr::file(1024, 0o644);
        assert!(file.is_file() && !file.is_dir());
        assert_eq!((file.size, file.perm), (1024, 0o644));

        let dir = FileAttr::directory(0o755);
        assert!(dir.is_dir() && !dir.is_file());
        assert_eq!(dir.size, 0);

        assert!(!FileType::Symlink.is_dir());
    }
}
