//! Per-snapshot records.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::version::VersionString;

/// Default mode bits for snapshot and entity directories (rwxr-xr-x).
pub const DIR_MODE: u32 = 0o755;

/// Handle to a snapshot's stored content: the snapshot's storage path
/// relative to the passthrough root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(PathBuf);

impl ContentRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for ContentRef {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

/// One existing snapshot of a versioned entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDirectory {
    /// Version naming this snapshot's directory.
    pub version: VersionString,
    /// Where the snapshot's content lives.
    pub content: ContentRef,
    /// Unix mode bits of the snapshot directory.
    pub mode: u32,
    /// Size of this snapshot's own content.
    pub own_size: u64,
    /// `own_size` plus the own sizes of every descendant.
    pub subtree_size: u64,
    /// Number of direct children in the version tree.
    pub child_count: usize,
}

impl SnapshotDirectory {
    /// A freshly allocated, empty snapshot.
    pub fn new(version: VersionString, content: ContentRef) -> Self {
        Self {
            version,
            content,
            mode: DIR_MODE,
            own_size: 0,
            subtree_size: 0,
            child_count: 0,
        }
    }

    /// Builder: set the own content size (subtree starts equal to it).
    pub fn with_own_size(mut self, size: u64) -> Self {
        self.own_size = size;
        self.subtree_size = size;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}
