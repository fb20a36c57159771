pub mod bucket_path;
pub mod counter;
pub mod log;
pub mod placement;

pub use bucket_path::{BucketPath, Occupancy, LEAF_EXTENSION};
pub use counter::{count_leaves, StorageLimit};
pub use log::{
    hash_bytes, hash_file, list_log_files, LogReader, LogRecord, RecordStatus, StatusChecker,
    StorageLog,
};
pub use placement::{Action, OverflowPolicy, Placement, PlacementEngine, PlannedPlacement};

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Shape of the bucket tree on disk
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeStats {
    pub leaves: u64,
    pub branches: u64,
    pub total_bytes: u64,
    /// Deepest leaf depth (0 = directly under the root)
    pub max_depth: usize,
    /// Leaves per depth, index = depth
    pub leaves_per_depth: Vec<u64>,
    pub storage_dir: PathBuf,
}

/// Walk the tree and summarise it. Logs and temp files are not counted.
pub fn tree_stats(root: &Path) -> Result<TreeStats> {
    let mut stats = TreeStats {
        storage_dir: root.to_path_buf(),
        ..Default::default()
    };

    if !root.exists() {
        return Ok(stats);
    }

    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry =
            entry.with_context(|| format!("Failed to walk storage tree: {}", root.display()))?;
        let depth = entry.depth() - 1;

        if entry.file_type().is_dir() {
            stats.branches += 1;
        } else if entry.file_type().is_file() && counter::is_leaf(entry.path()) {
            stats.leaves += 1;
            stats.total_bytes += entry.metadata()?.len();
            stats.max_depth = stats.max_depth.max(depth);
            if stats.leaves_per_depth.len() <= depth {
                stats.leaves_per_depth.resize(depth + 1, 0);
            }
            stats.leaves_per_depth[depth] += 1;
        }
    }

    Ok(stats)
}
