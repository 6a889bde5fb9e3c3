//! Snapshot allocation.
//!
//! Given an entity directory and its current version, reserve the directory
//! for the next snapshot. The trunk slot (`current.increment()`) is tried
//! first; if it is taken, a branch is rooted at the current version and
//! deepened until a free name is found:
//!
//! ```text
//! doc/1.2.3  current
//! doc/1.2.4  trunk slot          (taken)
//! doc/1.2.3.1                    (taken)
//! doc/1.2.3.0.1                  ← claimed
//! ```
//!
//! The claim is the atomic `create_dir` itself. Its "already exists" outcome
//! is the only collision signal, so racing allocators from the same starting
//! version always end up with distinct versions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use studentfs_types::{DIR_MODE, VersionString};

use crate::error::{SnapshotError, SnapshotResult};
use crate::vfs::PassthroughOps;

/// Upper bound on `create_dir` attempts per allocation (trunk slot, branch
/// root, then deepenings).
pub const MAX_ALLOCATION_ATTEMPTS: usize = 32;

/// A reserved snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Version of the new snapshot.
    pub version: VersionString,
    /// Storage path: the entity directory joined with `version`.
    pub path: PathBuf,
}

/// Computes and reserves snapshot directories.
pub struct SnapshotAllocator {
    fs: Arc<dyn PassthroughOps>,
    dir_mode: u32,
}

impl SnapshotAllocator {
    pub fn new(fs: Arc<dyn PassthroughOps>) -> Self {
        Self {
            fs,
            dir_mode: DIR_MODE,
        }
    }

    /// Mode bits for entity and snapshot directories.
    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    pub fn dir_mode(&self) -> u32 {
        self.dir_mode
    }

    /// Reserve the directory for the snapshot after `current`.
    pub fn allocate_next(
        &self,
        entity_dir: &Path,
        current: &VersionString,
    ) -> SnapshotResult<Allocation> {
        self.ensure_entity_dir(entity_dir)?;

        let mut candidate = current.increment()?;
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let path = entity_dir.join(candidate.format());
            match self.fs.create_dir(&path, self.dir_mode) {
                Ok(()) => {
                    tracing::info!(
                        entity = %entity_dir.display(),
                        base = %current,
                        version = %candidate,
                        attempt,
                        "allocated snapshot"
                    );
                    return Ok(Allocation {
                        version: candidate,
                        path,
                    });
                }
                Err(e) if e.is_already_exists() => {
                    let next = if attempt == 1 {
                        current.derive_sub_branch()
                    } else {
                        candidate.deepen()
                    };
                    tracing::debug!(
                        entity = %entity_dir.display(),
                        taken = %candidate,
                        next = %next,
                        "snapshot slot taken"
                    );
                    candidate = next;
                }
                Err(source) => {
                    return Err(SnapshotError::DirectoryCreate { path, source });
                }
            }
        }

        tracing::warn!(
            entity = %entity_dir.display(),
            base = %current,
            "snapshot allocation exhausted"
        );
        Err(SnapshotError::AllocationRaceExhausted {
            base: current.clone(),
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    /// Make sure the entity directory exists with directory mode bits.
    ///
    /// An existing entry at that path is left alone; if it is not a
    /// directory, the snapshot create that follows reports it.
    fn ensure_entity_dir(&self, entity_dir: &Path) -> SnapshotResult<()> {
        match self.fs.create_dir(entity_dir, self.dir_mode) {
            Ok(()) => {
                tracing::debug!(entity = %entity_dir.display(), "created entity directory");
            }
            Err(e) if e.is_already_exists() => {}
            Err(source) => {
                return Err(SnapshotError::DirectoryCreate {
                    path: entity_dir.to_path_buf(),
                    source,
                });
            }
        }

        if let Err(e) = self.fs.set_mode(entity_dir, self.dir_mode) {
            tracing::warn!(entity = %entity_dir.display(), error = %e, "could not set entity directory mode");
        }
        Ok(())
    }
}
