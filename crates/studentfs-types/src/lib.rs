//! Version identifiers and snapshot records for studentfs.
//!
//! This crate is the leaf of the workspace: it knows nothing about
//! filesystems. It defines how versions are parsed and derived, and the
//! records the kernel keeps for each versioned entity.
//!
//! # Key Types
//!
//! |-----------------------|----------------------------------------------|
//! | Type                  | Purpose                                      |
//! |-----------------------|----------------------------------------------|
//! | [`VersionString`]     | Parsed dotted version (`1.2.3`)              |
//! | [`SnapshotDirectory`] | One snapshot: content ref, mode, sizes       |
//! | [`VersionedEntity`]   | One versioned file and its snapshot tree     |
//! | [`ContentRef`]        | Storage path of a snapshot's content         |
//! |-----------------------|----------------------------------------------|

pub mod entity;
pub mod snapshot;
pub mod version;

pub use entity::{RecordError, VersionedEntity};
pub use snapshot::{ContentRef, DIR_MODE, SnapshotDirectory};
pub use version::{VersionError, VersionString};
