//! Placement engine
//!
//! Decides where a new image lands in the bucket tree and performs the
//! filesystem mutation. Every decision is local: the engine probes the
//! occupancy of the paths along the image's feature prefix and consults the
//! [`StorageLimit`] counter, nothing else.
//!
//! ## Decision procedure
//!
//! 1. Descend from depth 0 while the current path is a branch and deeper
//!    levels remain. This finds the frontier of the existing subdivision.
//! 2. Capacity reached (`used >= capacity`):
//!    - depth > 0: step back to the parent branch and collapse it into a
//!      single leaf (eviction by coarsening)
//!    - depth == 0: overwrite the leaf there, or store a new leaf and handle
//!      the overflow according to [`OverflowPolicy`]
//! 3. Capacity available:
//!    - path empty: store a new leaf
//!    - path occupied and deeper levels remain: branch. The previous occupant
//!      is discarded, not relocated. Its feature sequence is not retained.
//!    - path occupied at the deepest level: overwrite
//!
//! The engine is single-writer. Running `place` twice with the same features
//! against the same tree state produces the same path and the same mutation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::bucket_path::{BucketPath, Occupancy};
use super::counter::{count_leaves, is_leaf, StorageLimit};
use super::log::{hash_bytes, LogRecord, StorageLog};
use crate::features::FeatureSequence;
use crate::logging::operations;

/// What to do when a store at depth 0 pushes the counter above capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Remove the depth-0 bucket numerically closest to the new leaf
    #[default]
    EvictNearest,
    /// Warn and keep operating above capacity
    Allow,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "evict-nearest" => Ok(Self::EvictNearest),
            "allow" => Ok(Self::Allow),
            _ => anyhow::bail!(
                "Invalid overflow policy: {}. Must be evict-nearest or allow",
                s
            ),
        }
    }
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvictNearest => "evict-nearest",
            Self::Allow => "allow",
        }
    }
}

/// Kind of mutation a placement performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// New leaf at an empty path
    Stored,
    /// Existing leaf (or branch at the deepest level) replaced in place
    Overwrote,
    /// Leaf converted into a branch, new leaf stored one level deeper
    Branched,
    /// Parent branch collapsed into a single leaf under capacity pressure
    Coarsened,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Overwrote => "overwrote",
            Self::Branched => "branched",
            Self::Coarsened => "coarsened",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the decision procedure, before any mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPlacement {
    /// Path the new leaf will be written to
    pub target: BucketPath,
    pub action: Action,
    /// Depth reached by descending past existing branches
    pub frontier: usize,
    /// The store will push the counter above capacity
    pub overflow: bool,
}

/// Result of a completed placement
#[derive(Debug, Clone, Serialize)]
pub struct Placement {
    /// Leaf path relative to the storage root
    pub leaf: PathBuf,
    pub depth: usize,
    pub action: Action,
    /// Leaves deleted to make room (occupant, collapsed branch, or overflow victim)
    pub removed: u64,
    /// Counter value after the placement
    pub used: u64,
    pub content_hash: String,
    /// Depth-0 bucket removed to resolve an overflow
    pub overflow_evicted: Option<PathBuf>,
}

pub struct PlacementEngine {
    root: PathBuf,
    log: StorageLog,
    overflow_policy: OverflowPolicy,
}

impl PlacementEngine {
    pub fn new(root: impl Into<PathBuf>, overflow_policy: OverflowPolicy) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory: {}", root.display()))?;

        Ok(Self {
            log: StorageLog::new(&root),
            root,
            overflow_policy,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where an image with these features would land, without touching storage
    pub fn locate(&self, limit: &StorageLimit, features: &FeatureSequence) -> PlannedPlacement {
        let max_depth = features.max_depth();
        let at = |depth: usize| self.path_at(features, depth);

        let mut depth = 0;
        while depth < max_depth && Occupancy::probe(&at(depth)) == Occupancy::Branch {
            debug!(depth, path = %at(depth), "Descending past branch");
            depth += 1;
        }
        let frontier = depth;
        let occupancy = Occupancy::probe(&at(depth));

        let (depth, action, overflow) = if limit.reached() {
            if depth > 0 {
                (depth - 1, Action::Coarsened, false)
            } else if occupancy.is_occupied() {
                (0, Action::Overwrote, false)
            } else {
                (0, Action::Stored, true)
            }
        } else if !occupancy.is_occupied() {
            (depth, Action::Stored, false)
        } else if depth < max_depth {
            (depth + 1, Action::Branched, false)
        } else {
            (depth, Action::Overwrote, false)
        };

        PlannedPlacement {
            target: at(depth),
            action,
            frontier,
            overflow,
        }
    }

    /// Store `image` according to its features, updating `limit` and the
    /// storage log
    pub fn place(
        &self,
        limit: &mut StorageLimit,
        image: &[u8],
        features: &FeatureSequence,
    ) -> Result<Placement> {
        let plan = self.locate(limit, features);
        let had_room = !limit.reached();
        let content_hash = hash_bytes(image);

        let mut removed = match plan.action {
            Action::Branched => {
                let branch_point = self.path_at(features, plan.frontier);
                self.branch(limit, &branch_point, &plan.target, image)?
            }
            _ => self.store(limit, &plan.target, image)?,
        };

        if plan.action == Action::Overwrote && had_room {
            warn!(
                operation = operations::PLACE,
                path = %plan.target,
                depth = plan.target.depth(),
                "No deeper feature levels left, overwriting instead of branching"
            );
        }

        let mut overflow_evicted = None;
        if limit.used() > limit.capacity() {
            warn!(
                operation = operations::PLACE,
                used = limit.used(),
                capacity = limit.capacity(),
                policy = self.overflow_policy.as_str(),
                "Storage above capacity at the coarsest level"
            );
            if self.overflow_policy == OverflowPolicy::EvictNearest {
                if let Some((victim, count)) =
                    self.evict_nearest_root_bucket(limit, plan.target.segments()[0])?
                {
                    removed += count;
                    overflow_evicted = Some(victim);
                }
            }
        }

        // The leaf is already in place; a missing record only affects reporting
        let leaf = plan.target.relative_leaf();
        if let Err(e) = self
            .log
            .append(&LogRecord::new(content_hash.clone(), leaf.clone()))
        {
            warn!(
                operation = operations::LOG_APPEND,
                path = %leaf.display(),
                error = %format!("{:#}", e),
                "Failed to append storage log record"
            );
        }

        info!(
            operation = operations::PLACE,
            action = %plan.action,
            path = %leaf.display(),
            depth = plan.target.depth(),
            removed,
            used = limit.used(),
            capacity = limit.capacity(),
            "Image stored"
        );

        Ok(Placement {
            leaf,
            depth: plan.target.depth(),
            action: plan.action,
            removed,
            used: limit.used(),
            content_hash,
            overflow_evicted,
        })
    }

    fn path_at(&self, features: &FeatureSequence, depth: usize) -> BucketPath {
        BucketPath::at(&self.root, features, depth)
    }

    /// Write a leaf at `target`, replacing whatever occupies it. Returns the
    /// number of leaves removed.
    fn store(&self, limit: &mut StorageLimit, target: &BucketPath, image: &[u8]) -> Result<u64> {
        let staged = stage(&target.parent_dir(), image)?;

        let branch_dir = target.branch_dir();
        let mut removed = 0;
        if branch_dir.is_dir() {
            removed = remove_tree(limit, &branch_dir)?;
        }

        let leaf = target.leaf_file();
        let replaced = leaf.is_file();
        persist(staged, &leaf)?;
        if replaced {
            removed += 1;
            limit.decrement(1);
        }
        limit.increment(1);

        Ok(removed)
    }

    /// Turn the leaf at `branch_point` into a directory and store the new
    /// image at `target` beneath it. The old leaf is discarded.
    fn branch(
        &self,
        limit: &mut StorageLimit,
        branch_point: &BucketPath,
        target: &BucketPath,
        image: &[u8],
    ) -> Result<u64> {
        let dir = branch_point.branch_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create branch directory: {}", dir.display()))?;

        let staged = match stage(&dir, image) {
            Ok(staged) => staged,
            Err(e) => {
                abandon_branch(&dir, None);
                return Err(e);
            }
        };

        let mut removed = 0;
        let old_leaf = branch_point.leaf_file();
        if old_leaf.is_file() {
            if let Err(e) = fs::remove_file(&old_leaf) {
                abandon_branch(&dir, Some(staged));
                return Err(e)
                    .with_context(|| format!("Failed to remove leaf: {}", old_leaf.display()));
            }
            removed = 1;
            limit.decrement(1);
        }
        debug!(path = %branch_point, "Branched");

        if let Err(e) = persist(staged, &target.leaf_file()) {
            abandon_branch(&dir, None);
            return Err(e);
        }
        limit.increment(1);

        Ok(removed)
    }

    /// Remove the depth-0 bucket (leaf or branch) closest in value to `keep`,
    /// never `keep` itself. Ties go to the lower value.
    fn evict_nearest_root_bucket(
        &self,
        limit: &mut StorageLimit,
        keep: u32,
    ) -> Result<Option<(PathBuf, u64)>> {
        let mut nearest: Option<(u32, u32, PathBuf)> = None;

        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read storage directory: {}", self.root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let name = if entry.file_type()?.is_dir() {
                path.file_name()
            } else if is_leaf(&path) {
                path.file_stem()
            } else {
                None
            };
            let Some(value) = name
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            if value == keep {
                continue;
            }

            let candidate = (value.abs_diff(keep), value, path);
            if nearest.as_ref().map_or(true, |best| {
                (candidate.0, candidate.1) < (best.0, best.1)
            }) {
                nearest = Some(candidate);
            }
        }

        let Some((_, _, victim)) = nearest else {
            return Ok(None);
        };

        let count = if victim.is_dir() {
            remove_tree(limit, &victim)?
        } else {
            fs::remove_file(&victim)
                .with_context(|| format!("Failed to remove leaf: {}", victim.display()))?;
            limit.decrement(1);
            1
        };

        let relative = victim
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| victim.clone());
        warn!(
            operation = operations::OVERFLOW_EVICT,
            path = %relative.display(),
            removed = count,
            used = limit.used(),
            "Evicted nearest top-level bucket"
        );

        Ok(Some((relative, count)))
    }
}

/// Write `data` to a temp file in `dir`, ready to be renamed into place
fn stage(dir: &Path, data: &[u8]) -> Result<NamedTempFile> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in: {}", dir.display()))?;
    staged
        .write_all(data)
        .with_context(|| format!("Failed to write temp file in: {}", dir.display()))?;
    staged.flush()?;

    Ok(staged)
}

fn persist(staged: NamedTempFile, leaf: &Path) -> Result<()> {
    staged
        .persist(leaf)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write leaf: {}", leaf.display()))?;
    Ok(())
}

/// Undo a branch that failed before its first leaf was persisted. An empty
/// directory would shadow the leaf next to it.
fn abandon_branch(dir: &Path, staged: Option<NamedTempFile>) {
    drop(staged);
    if let Err(e) = fs::remove_dir(dir) {
        warn!(path = %dir.display(), error = %e, "Failed to remove abandoned branch");
    }
}

/// Recursively delete a branch and decrement `limit` by the leaves it held.
/// When the removal stops part-way, only the leaves actually gone are counted.
fn remove_tree(limit: &mut StorageLimit, dir: &Path) -> Result<u64> {
    let count = count_leaves(dir)?;

    if let Err(e) = fs::remove_dir_all(dir) {
        let gone = count.saturating_sub(count_leaves(dir)?);
        limit.decrement(gone);
        return Err(e).with_context(|| format!("Failed to remove branch: {}", dir.display()));
    }

    limit.decrement(count);
    debug!(path = %dir.display(), leaves = count, "Removed branch");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn features(levels: &[u32]) -> FeatureSequence {
        FeatureSequence::new(levels.to_vec(), 1024).unwrap()
    }

    fn setup(capacity: u64, policy: OverflowPolicy) -> (TempDir, PlacementEngine, StorageLimit) {
        let temp_dir = TempDir::new().unwrap();
        let engine = PlacementEngine::new(temp_dir.path(), policy).unwrap();
        let mut limit = StorageLimit::new(temp_dir.path(), capacity);
        limit.reconcile().unwrap();
        (temp_dir, engine, limit)
    }

    #[test]
    fn test_store_into_empty_tree() {
        let (dir, engine, mut limit) = setup(3, OverflowPolicy::default());

        let placement = engine
            .place(&mut limit, b"a", &features(&[5, 1, 2]))
            .unwrap();

        assert_eq!(placement.action, Action::Stored);
        assert_eq!(placement.leaf, PathBuf::from("5.jpg"));
        assert_eq!(placement.used, 1);
        assert_eq!(fs::read(dir.path().join("5.jpg")).unwrap(), b"a");
    }

    #[test]
    fn test_branch_discards_previous_occupant() {
        let (dir, engine, mut limit) = setup(3, OverflowPolicy::default());
        engine.place(&mut limit, b"a", &features(&[5, 1])).unwrap();

        let placement = engine.place(&mut limit, b"b", &features(&[5, 2])).unwrap();

        assert_eq!(placement.action, Action::Branched);
        assert_eq!(placement.leaf, PathBuf::from("5/2.jpg"));
        assert_eq!(placement.removed, 1);
        assert_eq!(limit.used(), 1);
        assert!(dir.path().join("5").is_dir());
        assert!(!dir.path().join("5.jpg").exists());
        assert_eq!(fs::read(dir.path().join("5/2.jpg")).unwrap(), b"b");
    }

    #[test]
    fn test_overwrite_at_deepest_level() {
        let (dir, engine, mut limit) = setup(10, OverflowPolicy::default());
        engine.place(&mut limit, b"a", &features(&[5])).unwrap();

        let placement = engine.place(&mut limit, b"b", &features(&[5])).unwrap();

        assert_eq!(placement.action, Action::Overwrote);
        assert_eq!(limit.used(), 1);
        assert_eq!(fs::read(dir.path().join("5.jpg")).unwrap(), b"b");
    }

    #[test]
    fn test_coarsen_collapses_parent_branch() {
        let (dir, engine, mut limit) = setup(3, OverflowPolicy::default());
        engine.place(&mut limit, b"a", &features(&[5, 1])).unwrap();
        engine.place(&mut limit, b"b", &features(&[5, 2])).unwrap();
        engine.place(&mut limit, b"c", &features(&[5, 3])).unwrap();
        engine.place(&mut limit, b"d", &features(&[5, 4])).unwrap();
        assert!(limit.reached());

        let placement = engine.place(&mut limit, b"e", &features(&[5, 9])).unwrap();

        assert_eq!(placement.action, Action::Coarsened);
        assert_eq!(placement.leaf, PathBuf::from("5.jpg"));
        assert_eq!(placement.removed, 3);
        assert_eq!(limit.used(), 1);
        assert!(!dir.path().join("5").exists());
        assert_eq!(fs::read(dir.path().join("5.jpg")).unwrap(), b"e");
    }

    #[test]
    fn test_overflow_evicts_nearest_root_bucket() {
        let (dir, engine, mut limit) = setup(2, OverflowPolicy::EvictNearest);
        engine.place(&mut limit, b"a", &features(&[10])).unwrap();
        engine.place(&mut limit, b"b", &features(&[20])).unwrap();

        let placement = engine.place(&mut limit, b"c", &features(&[14])).unwrap();

        assert_eq!(placement.action, Action::Stored);
        assert_eq!(placement.overflow_evicted, Some(PathBuf::from("10.jpg")));
        assert_eq!(limit.used(), 2);
        assert!(!dir.path().join("10.jpg").exists());
        assert!(dir.path().join("14.jpg").exists());
        assert!(dir.path().join("20.jpg").exists());
    }

    #[test]
    fn test_overflow_tie_prefers_lower_bucket() {
        let (dir, engine, mut limit) = setup(2, OverflowPolicy::EvictNearest);
        engine.place(&mut limit, b"a", &features(&[10])).unwrap();
        engine.place(&mut limit, b"b", &features(&[20])).unwrap();

        engine.place(&mut limit, b"c", &features(&[15])).unwrap();

        assert!(!dir.path().join("10.jpg").exists());
        assert!(dir.path().join("20.jpg").exists());
    }

    #[test]
    fn test_overflow_allowed() {
        let (_dir, engine, mut limit) = setup(1, OverflowPolicy::Allow);
        engine.place(&mut limit, b"a", &features(&[10])).unwrap();

        let placement = engine.place(&mut limit, b"b", &features(&[11])).unwrap();

        assert_eq!(placement.overflow_evicted, None);
        assert_eq!(limit.used(), 2);
    }

    #[test]
    fn test_locate_does_not_mutate() {
        let (dir, engine, mut limit) = setup(3, OverflowPolicy::default());
        engine.place(&mut limit, b"a", &features(&[5, 1])).unwrap();

        let plan = engine.locate(&limit, &features(&[5, 2]));

        assert_eq!(plan.action, Action::Branched);
        assert_eq!(plan.target.relative_leaf(), PathBuf::from("5/2.jpg"));
        assert_eq!(plan.frontier, 0);
        assert!(dir.path().join("5.jpg").is_file());
        assert!(!dir.path().join("5").exists());
    }

    #[test]
    fn test_failed_branch_leaves_tree_untouched() {
        let (dir, engine, mut limit) = setup(3, OverflowPolicy::default());
        engine.place(&mut limit, b"a", &features(&[5, 1])).unwrap();

        // A regular file where the branch directory must go
        fs::write(dir.path().join("5"), b"blocker").unwrap();
        let result = engine.place(&mut limit, b"b", &features(&[5, 2]));

        assert!(result.is_err());
        assert_eq!(limit.used(), 1);
        assert!(dir.path().join("5.jpg").is_file());
    }

    #[test]
    fn test_coarsen_even_when_frontier_leaf_is_occupied() {
        let (dir, engine, mut limit) = setup(3, OverflowPolicy::default());
        engine.place(&mut limit, b"a", &features(&[5, 1])).unwrap();
        engine.place(&mut limit, b"b", &features(&[5, 2])).unwrap();
        engine.place(&mut limit, b"c", &features(&[5, 3])).unwrap();
        engine.place(&mut limit, b"d", &features(&[5, 4])).unwrap();
        assert!(dir.path().join("5/3.jpg").is_file());

        let placement = engine.place(&mut limit, b"e", &features(&[5, 3])).unwrap();

        assert_eq!(placement.action, Action::Coarsened);
        assert_eq!(placement.leaf, PathBuf::from("5.jpg"));
        assert_eq!(placement.removed, 3);
        assert_eq!(limit.used(), 1);
    }

    #[test]
    fn test_log_failure_does_not_fail_placement() {
        let (dir, engine, mut limit) = setup(3, OverflowPolicy::default());
        let log_path = StorageLog::new(dir.path()).path_for(Utc::now().date_naive());
        // A directory where today's log file should be
        fs::create_dir_all(&log_path).unwrap();

        let placement = engine
            .place(&mut limit, b"a", &features(&[4, 2]))
            .unwrap();

        assert_eq!(placement.action, Action::Stored);
        assert_eq!(limit.used(), 1);
        assert!(dir.path().join("4.jpg").is_file());
    }

    #[test]
    fn test_remove_tree_updates_counter() {
        let temp_dir = TempDir::new().unwrap();
        let branch = temp_dir.path().join("5");
        fs::create_dir_all(branch.join("1")).unwrap();
        fs::write(branch.join("2.jpg"), b"a").unwrap();
        fs::write(branch.join("1/7.jpg"), b"b").unwrap();

        let mut limit = StorageLimit::new(temp_dir.path(), 10);
        limit.reconcile().unwrap();
        assert_eq!(limit.used(), 2);

        assert_eq!(remove_tree(&mut limit, &branch).unwrap(), 2);
        assert_eq!(limit.used(), 0);
        assert!(!branch.exists());
    }

    #[test]
    fn test_abandoned_branch_is_removed_with_staged_file() {
        let temp_dir = TempDir::new().unwrap();
        let branch_dir = temp_dir.path().join("5");
        let staged = stage(&branch_dir, b"new").unwrap();
        assert_eq!(fs::read_dir(&branch_dir).unwrap().count(), 1);

        abandon_branch(&branch_dir, Some(staged));

        assert!(!branch_dir.exists());
    }

    #[test]
    fn test_overflow_policy_from_str() {
        assert_eq!(
            "evict-nearest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::EvictNearest
        );
        assert_eq!(
            "ALLOW".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::Allow
        );
        assert!("random".parse::<OverflowPolicy>().is_err());
    }
}
