//! Passthrough filesystem layer.
//!
//! The versioning core sees the host filesystem only through this module.
//! Key components:
//!
//! - [`PassthroughOps`] - Blocking directory and file primitives
//! - [`LocalBackend`] - Host filesystem access (with path security)
//! - [`MemoryBackend`] - In-memory filesystem with fault injection (testing)
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: Operations use paths relative to the
//!   backend root.
//! - **Atomic create is the claim**: [`PassthroughOps::create_dir`] reports
//!   an existing path as [`VfsError::AlreadyExists`], which is the only
//!   signal the allocator trusts for collisions.

pub mod backends;
mod error;
mod ops;
mod types;

pub use backends::{LocalBackend, MemoryBackend};
pub use error::{VfsError, VfsResult};
pub use ops::PassthroughOps;
pub use types::{DirEntry, FileAttr, FileType};
