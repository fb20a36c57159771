//! Bucket path resolution
//!
//! A bucket path is the prefix `levels[0..=depth]` of a feature sequence,
//! rendered as decimal segments under the storage root:
//!
//! ```text
//! <root>/5/1      branch point (directory)
//! <root>/5/1.jpg  leaf (stored image)
//! ```
//!
//! Resolution is pure. Only [`Occupancy::probe`] touches the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::features::FeatureSequence;

/// Extension of every stored leaf
pub const LEAF_EXTENSION: &str = "jpg";

/// The prefix of a feature sequence at a given depth, anchored at a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketPath {
    root: PathBuf,
    segments: Vec<u32>,
}

impl BucketPath {
    /// Resolve at `depth`, clamped to the deepest level of the sequence
    pub fn at(root: &Path, features: &FeatureSequence, depth: usize) -> Self {
        let prefix = features
            .prefix(depth.min(features.max_depth()))
            .unwrap_or(features.levels());
        Self {
            root: root.to_path_buf(),
            segments: prefix.to_vec(),
        }
    }

    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len() - 1
    }

    /// Directory form of this path (a branch point)
    pub fn branch_dir(&self) -> PathBuf {
        self.root.join(self.relative())
    }

    /// File form of this path (a leaf)
    pub fn leaf_file(&self) -> PathBuf {
        self.root.join(self.relative_leaf())
    }

    /// Leaf path relative to the storage root, as written to the storage log
    pub fn relative_leaf(&self) -> PathBuf {
        let mut path = self.relative();
        path.set_extension(LEAF_EXTENSION);
        path
    }

    /// Directory that holds this path's leaf or branch
    pub fn parent_dir(&self) -> PathBuf {
        let dir = self.branch_dir();
        dir.parent().map(Path::to_path_buf).unwrap_or(dir)
    }

    fn relative(&self) -> PathBuf {
        self.segments.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for BucketPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        write!(f, "{}", joined.join("/"))
    }
}

/// What currently lives at a bucket path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    Empty,
    Leaf,
    Branch,
}

impl Occupancy {
    /// Inspect the filesystem. A directory wins over a stray leaf with the
    /// same stem, which can only be left behind by an interrupted branch.
    pub fn probe(path: &BucketPath) -> Self {
        if path.branch_dir().is_dir() {
            Self::Branch
        } else if path.leaf_file().is_file() {
            Self::Leaf
        } else {
            Self::Empty
        }
    }

    pub fn is_occupied(self) -> bool {
        self != Self::Empty
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Leaf => "leaf",
            Self::Branch => "branch",
        }
    }
}
