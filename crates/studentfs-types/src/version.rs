//! Dotted version identifiers.
//!
//! A [`VersionString`] is a non-empty sequence of non-negative integer
//! segments with a canonical text form (`1.2.3`). Values are immutable:
//! every derivation returns a new value.
//!
//! The trunk advances by incrementing the last segment. When the trunk's next
//! slot is already taken, a branch is rooted at the contested version by
//! appending a `1` segment, and further collisions deepen that branch:
//!
//! ```text
//! 1.2.3 ─ increment ──▶ 1.2.4
//!   │
//!   └── derive_sub_branch ──▶ 1.2.3.1 ── deepen ──▶ 1.2.3.0.1 ── deepen ──▶ 1.2.3.0.0.1
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a version string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// Input was the empty string.
    #[error("version string is empty")]
    Empty,

    /// A dot-separated segment is not a canonical non-negative integer.
    #[error("invalid segment {segment:?} in version {input:?}")]
    InvalidSegment { input: String, segment: String },

    /// A segment does not fit in `u64`, or incrementing it would overflow.
    #[error("segment overflow in version {input:?}")]
    SegmentOverflow { input: String },
}

/// A parsed dotted version such as `1.2.3`.
#[derive(Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionString {
    segments: Vec<u64>,
}

impl VersionString {
    /// Parse a dotted version.
    ///
    /// Each segment must be ASCII digits with no sign and no leading zero
    /// (other than `0` itself), so every accepted input is already canonical.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        if text.is_empty() {
            return Err(VersionError::Empty);
        }

        let segments = text
            .split('.')
            .map(|segment| parse_segment(text, segment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    /// Build from raw segments. Returns `None` for an empty sequence.
    pub fn from_segments(segments: Vec<u64>) -> Option<Self> {
        if segments.is_empty() {
            None
        } else {
            Some(Self { segments })
        }
    }

    /// First version of a fresh entity: `1`.
    pub fn initial() -> Self {
        Self { segments: vec![1] }
    }

    /// Canonical dotted form.
    pub fn format(&self) -> String {
        self.to_string()
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn last_segment(&self) -> u64 {
        // Non-empty by construction.
        self.segments[self.segments.len() - 1]
    }

    /// The branch namespace: every segment except the last.
    pub fn prefix(&self) -> &[u64] {
        &self.segments[..self.segments.len() - 1]
    }

    /// Next trunk version: last segment plus one, prefix unchanged.
    pub fn increment(&self) -> Result<Self, VersionError> {
        let mut segments = self.segments.clone();
        let last = segments.len() - 1;
        segments[last] = segments[last]
            .checked_add(1)
            .ok_or_else(|| VersionError::SegmentOverflow {
                input: self.to_string(),
            })?;
        Ok(Self { segments })
    }

    /// Root a new branch at this version by appending a `1` segment.
    ///
    /// Applies at every depth, including single-segment versions (`3 -> 3.1`).
    pub fn derive_sub_branch(&self) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(1);
        Self { segments }
    }

    /// Move a contested branch one level deeper: the terminal segment
    /// becomes `0` and a fresh `1` is appended.
    pub fn deepen(&self) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(self.prefix());
        segments.push(0);
        segments.push(1);
        Self { segments }
    }

    /// Logical parent in the version tree.
    ///
    /// A trunk step points back to its predecessor (`1.2.4 -> 1.2.3`). A
    /// branch root points at the version it was rooted on, skipping the
    /// zero padding added by [`deepen`](Self::deepen)
    /// (`1.2.3.0.1 -> 1.2.3`). Returns `None` for a tree root.
    pub fn parent(&self) -> Option<Self> {
        let last = self.last_segment();
        if last > 1 {
            let mut segments = self.segments.clone();
            let idx = segments.len() - 1;
            segments[idx] = last - 1;
            return Some(Self { segments });
        }

        let mut segments = self.prefix().to_vec();
        while segments.last() == Some(&0) {
            segments.pop();
        }
        Self::from_segments(segments)
    }

    /// True if `self` lies strictly below `other` in the version tree.
    pub fn is_descendant_of(&self, other: &VersionString) -> bool {
        let mut cursor = self.parent();
        while let Some(v) = cursor {
            if &v == other {
                return true;
            }
            cursor = v.parent();
        }
        false
    }
}

fn parse_segment(input: &str, segment: &str) -> Result<u64, VersionError> {
    let invalid = || VersionError::InvalidSegment {
        input: input.to_string(),
        segment: segment.to_string(),
    };

    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return Err(invalid());
    }

    // All digits, so the only failure left is overflow.
    segment
        .parse::<u64>()
        .map_err(|_| VersionError::SegmentOverflow {
            input: input.to_string(),
        })
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionString({})", self)
    }
}

impl FromStr for VersionString {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionString {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<VersionString> for String {
    fn from(v: VersionString) -> String {
        v.to_string()
    }
}

impl Ord for VersionString {
    fn cmp(&self, other: &Self) -> Ordering {
        // Segment-wise; a strict prefix sorts first (1.2 < 1.2.0).
        self.segments.cmp(&other.segments)
    }
}

impl PartialOrd for VersionString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
