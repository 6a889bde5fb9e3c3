//! Snapshot allocation and registry errors.

use std::path::PathBuf;

use studentfs_types::{RecordError, VersionError, VersionString};
use thiserror::Error;

use crate::vfs::VfsError;

/// Errors surfaced by the allocator and the entity registry.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The entity's version state cannot be parsed or derived from.
    #[error("malformed version: {0}")]
    MalformedVersion(#[from] VersionError),

    /// Creating a snapshot or entity directory failed for a reason other
    /// than "already exists".
    #[error("failed to create directory {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: VfsError,
    },

    /// Every candidate up to the attempt bound was already claimed.
    #[error("allocation from {base} exhausted after {attempts} attempts")]
    AllocationRaceExhausted {
        base: VersionString,
        attempts: usize,
    },

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("entity already exists: {0}")]
    EntityExists(String),

    #[error("entity {entity} has no snapshot {version}")]
    UnknownVersion {
        entity: String,
        version: VersionString,
    },

    #[error("invalid entity name: {0:?}")]
    InvalidEntityName(String),

    /// Record bookkeeping rejected an update.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Any other passthrough failure.
    #[error("passthrough error: {0}")]
    Vfs(#[from] VfsError),
}

impl SnapshotError {
    /// Filesystem-style error code for replying to the write-triggering call.
    pub fn to_errno(&self) -> i32 {
        match self {
            SnapshotError::MalformedVersion(_) => libc::EIO,
            SnapshotError::DirectoryCreate { source, .. } => source.to_errno(),
            SnapshotError::AllocationRaceExhausted { .. } => libc::EAGAIN,
            SnapshotError::EntityNotFound(_) => libc::ENOENT,
            SnapshotError::EntityExists(_) => libc::EEXIST,
            SnapshotError::UnknownVersion { .. } => libc::ENOENT,
            SnapshotError::InvalidEntityName(_) => libc::EINVAL,
            SnapshotError::Record(_) => libc::EIO,
            SnapshotError::Vfs(e) => e.to_errno(),
        }
    }
}

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;
