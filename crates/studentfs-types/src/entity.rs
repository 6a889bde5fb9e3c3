//! Versioned entity records.
//!
//! A [`VersionedEntity`] is the in-memory view of one entity directory: its
//! snapshot records keyed by version, plus the current version. The version
//! tree is implicit in the keys. Each snapshot hangs off its nearest
//! ancestor (see [`VersionString::parent`]) that is actually present, or off
//! the root when there is none.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{ContentRef, SnapshotDirectory};
use crate::version::VersionString;

/// Record-level consistency errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("unknown version: {0}")]
    UnknownVersion(VersionString),

    #[error("version already recorded: {0}")]
    DuplicateVersion(VersionString),

    #[error("entity has no snapshots")]
    NoSnapshots,
}

/// One logical versioned file and all of its snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedEntity {
    name: String,
    snapshot_count: usize,
    current_version: VersionString,
    current_content: ContentRef,
    snapshots: BTreeMap<VersionString, SnapshotDirectory>,
}

impl VersionedEntity {
    /// Start an entity from its first snapshot.
    pub fn new(name: impl Into<String>, initial: SnapshotDirectory) -> Self {
        let mut initial = initial;
        initial.subtree_size = initial.own_size;
        initial.child_count = 0;

        let current_version = initial.version.clone();
        let current_content = initial.content.clone();
        let mut snapshots = BTreeMap::new();
        snapshots.insert(current_version.clone(), initial);

        Self {
            name: name.into(),
            snapshot_count: 1,
            current_version,
            current_content,
            snapshots,
        }
    }

    /// Rebuild an entity from snapshots found on disk.
    ///
    /// Incoming rollup fields are ignored and recomputed.
    pub fn from_snapshots(
        name: impl Into<String>,
        snapshots: impl IntoIterator<Item = SnapshotDirectory>,
        current: &VersionString,
    ) -> Result<Self, RecordError> {
        let snapshots: BTreeMap<_, _> = snapshots
            .into_iter()
            .map(|s| (s.version.clone(), s))
            .collect();

        if snapshots.is_empty() {
            return Err(RecordError::NoSnapshots);
        }
        let current_content = snapshots
            .get(current)
            .map(|s| s.content.clone())
            .ok_or_else(|| RecordError::UnknownVersion(current.clone()))?;

        let mut entity = Self {
            name: name.into(),
            snapshot_count: snapshots.len(),
            current_version: current.clone(),
            current_content,
            snapshots,
        };
        entity.rollup();
        Ok(entity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    pub fn current_version(&self) -> &VersionString {
        &self.current_version
    }

    pub fn current_content(&self) -> &ContentRef {
        &self.current_content
    }

    pub fn snapshot(&self, version: &VersionString) -> Option<&SnapshotDirectory> {
        self.snapshots.get(version)
    }

    pub fn contains(&self, version: &VersionString) -> bool {
        self.snapshots.contains_key(version)
    }

    /// All snapshots in version order.
    pub fn snapshots(&self) -> impl Iterator<Item = &SnapshotDirectory> {
        self.snapshots.values()
    }

    /// Nearest recorded ancestor of `version` in the version tree.
    pub fn tree_parent(&self, version: &VersionString) -> Option<&VersionString> {
        let mut cursor = version.parent();
        while let Some(candidate) = cursor {
            if let Some((key, _)) = self.snapshots.get_key_value(&candidate) {
                return Some(key);
            }
            cursor = candidate.parent();
        }
        None
    }

    /// Direct children of `parent` (`None` for the root), in version order.
    pub fn children(&self, parent: Option<&VersionString>) -> Vec<&SnapshotDirectory> {
        self.snapshots
            .values()
            .filter(|s| self.tree_parent(&s.version) == parent)
            .collect()
    }

    /// Total size of all snapshots (sum of the roots' subtree sizes).
    pub fn total_size(&self) -> u64 {
        self.children(None).iter().map(|s| s.subtree_size).sum()
    }

    /// Apply a successful allocation.
    ///
    /// Count, current version and current content change together. On error
    /// nothing is modified.
    pub fn record_allocation(&mut self, snapshot: SnapshotDirectory) -> Result<(), RecordError> {
        if self.snapshots.contains_key(&snapshot.version) {
            return Err(RecordError::DuplicateVersion(snapshot.version));
        }

        let mut snapshot = snapshot;
        snapshot.subtree_size = snapshot.own_size;
        snapshot.child_count = 0;

        let version = snapshot.version.clone();
        let content = snapshot.content.clone();
        let own_size = snapshot.own_size;

        // A snapshot inserted above existing ones re-parents them.
        let adopts_existing = self
            .snapshots
            .keys()
            .any(|v| v.is_descendant_of(&version));

        self.snapshots.insert(version.clone(), snapshot);

        if adopts_existing {
            self.rollup();
        } else {
            if let Some(parent) = self.tree_parent(&version).cloned() {
                if let Some(p) = self.snapshots.get_mut(&parent) {
                    p.child_count += 1;
                }
            }
            self.add_to_ancestors(&version, own_size as i128);
        }

        self.snapshot_count += 1;
        self.current_version = version;
        self.current_content = content;
        Ok(())
    }

    /// Point the record at an already recorded snapshot.
    ///
    /// Count is unchanged; the snapshot was counted when it was recorded.
    pub fn set_current(&mut self, version: &VersionString) -> Result<(), RecordError> {
        let content = self
            .snapshots
            .get(version)
            .map(|s| s.content.clone())
            .ok_or_else(|| RecordError::UnknownVersion(version.clone()))?;
        self.current_version = version.clone();
        self.current_content = content;
        Ok(())
    }

    /// Change a snapshot's own content size and roll the delta up the tree.
    pub fn set_own_size(&mut self, version: &VersionString, size: u64) -> Result<(), RecordError> {
        let snapshot = self
            .snapshots
            .get_mut(version)
            .ok_or_else(|| RecordError::UnknownVersion(version.clone()))?;

        let delta = size as i128 - snapshot.own_size as i128;
        snapshot.own_size = size;
        snapshot.subtree_size = apply_delta(snapshot.subtree_size, delta);
        self.add_to_ancestors(version, delta);
        Ok(())
    }

    fn add_to_ancestors(&mut self, version: &VersionString, delta: i128) {
        if delta == 0 {
            return;
        }
        let mut cursor = self.tree_parent(version).cloned();
        while let Some(ancestor) = cursor {
            if let Some(s) = self.snapshots.get_mut(&ancestor) {
                s.subtree_size = apply_delta(s.subtree_size, delta);
            }
            cursor = self.tree_parent(&ancestor).cloned();
        }
    }

    /// Recompute child counts and subtree sizes from own sizes.
    fn rollup(&mut self) {
        for s in self.snapshots.values_mut() {
            s.subtree_size = s.own_size;
            s.child_count = 0;
        }

        let versions: Vec<VersionString> = self.snapshots.keys().cloned().collect();
        for version in &versions {
            if let Some(parent) = self.tree_parent(version).cloned() {
                if let Some(p) = self.snapshots.get_mut(&parent) {
                    p.child_count += 1;
                }
            }
            let own = self.snapshots.get(version).map_or(0, |s| s.own_size);
            self.add_to_ancestors(version, own as i128);
        }
    }
}

fn apply_delta(value: u64, delta: i128) -> u64 {
    (value as i128 + delta).clamp(0, u64::MAX as i128) as u64
}
