//! Status and tree output.

use std::fmt;
use std::fmt::Write as _;

use serde::Serialize;
use studentfs_types::{SnapshotDirectory, VersionString, VersionedEntity};

#[derive(Debug, Serialize)]
pub struct Status {
    pub name: String,
    pub snapshots: usize,
    pub current_version: VersionString,
    pub current_content: String,
    pub total_size: u64,
}

impl From<&VersionedEntity> for Status {
    fn from(entity: &VersionedEntity) -> Self {
        Self {
            name: entity.name().to_string(),
            snapshots: entity.snapshot_count(),
            current_version: entity.current_version().clone(),
            current_content: entity.current_content().path().display().to_string(),
            total_size: entity.total_size(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "entity:    {}", self.name)?;
        writeln!(f, "current:   {}", self.current_version)?;
        writeln!(f, "content:   {}", self.current_content)?;
        writeln!(f, "snapshots: {}", self.snapshots)?;
        writeln!(f, "size:      {}", self.total_size)
    }
}

/// One snapshot and the snapshots hanging off it.
#[derive(Debug, Serialize)]
pub struct TreeNode {
    pub version: VersionString,
    pub current: bool,
    pub own_size: u64,
    pub subtree_size: u64,
    pub children: Vec<TreeNode>,
}

/// Root-level nodes of an entity's version tree.
pub fn tree(entity: &VersionedEntity) -> Vec<TreeNode> {
    entity
        .children(None)
        .into_iter()
        .map(|s| node(entity, s))
        .collect()
}

fn node(entity: &VersionedEntity, snapshot: &SnapshotDirectory) -> TreeNode {
    TreeNode {
        version: snapshot.version.clone(),
        current: &snapshot.version == entity.current_version(),
        own_size: snapshot.own_size,
        subtree_size: snapshot.subtree_size,
        children: entity
            .children(Some(&snapshot.version))
            .into_iter()
            .map(|s| node(entity, s))
            .collect(),
    }
}

pub fn render_tree(roots: &[TreeNode]) -> String {
    let mut out = String::new();
    for root in roots {
        render_node(&mut out, root, 0);
    }
    out
}

fn render_node(out: &mut String, node: &TreeNode, depth: usize) {
    let marker = if node.current { " *" } else { "" };
    // Writing to a String cannot fail.
    let _ = writeln!(
        out,
        "{:indent$}{} ({} / {}){}",
        "",
        node.version,
        node.own_size,
        node.subtree_size,
        marker,
        indent = depth * 2
    );
    for child in &node.children {
        render_node(out, child, depth + 1);
    }
}
