//! # studentfs-kernel
//!
//! Snapshot allocation core for studentfs.
//!
//! Every entity is a directory under the store root, and every snapshot of
//! it is a subdirectory named by its version:
//! - The passthrough layer ([`vfs`]) is the only way the core touches disk
//! - The allocator claims the next snapshot directory with an atomic mkdir
//! - The registry keeps one record per entity and applies allocations to it

pub mod allocator;
pub mod config;
pub mod error;
pub mod registry;
pub mod vfs;

pub use allocator::{Allocation, MAX_ALLOCATION_ATTEMPTS, SnapshotAllocator};
pub use config::{ConfigError, StoreConfig};
pub use error::{SnapshotError, SnapshotResult};
pub use registry::EntityRegistry;
pub use vfs::{
    DirEntry, FileAttr, FileType, LocalBackend, MemoryBackend, PassthroughOps, VfsError, VfsResult,
};
