//! Passthrough backends.
//!
//! Backends implement [`PassthroughOps`](crate::vfs::PassthroughOps) for
//! different storage types.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
