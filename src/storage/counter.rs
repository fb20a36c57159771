//! Storage limit counter
//!
//! Tracks how many leaves live under the storage root. The count is derived
//! once per process by walking the tree ([`StorageLimit::reconcile`]) and is
//! then maintained incrementally by the placement engine. It is never
//! persisted.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::bucket_path::LEAF_EXTENSION;
use crate::logging::operations;

#[derive(Debug)]
pub struct StorageLimit {
    root: PathBuf,
    used: u64,
    capacity: u64,
}

impl StorageLimit {
    /// Create a counter that starts at zero. Call [`reconcile`](Self::reconcile)
    /// before trusting it.
    pub fn new(root: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            root: root.into(),
            used: 0,
            capacity,
        }
    }

    /// Recount every leaf under the root
    pub fn reconcile(&mut self) -> Result<u64> {
        self.used = count_leaves(&self.root)?;
        info!(
            operation = operations::RECONCILE,
            used = self.used,
            capacity = self.capacity,
            "Storage counter reconciled"
        );
        Ok(self.used)
    }

    pub fn reached(&self) -> bool {
        self.used >= self.capacity
    }

    pub fn increment(&mut self, n: u64) -> u64 {
        self.used += n;
        debug!(used = self.used, delta = n, "Storage counter incremented");
        self.used
    }

    pub fn decrement(&mut self, n: u64) -> u64 {
        self.used = self.used.saturating_sub(n);
        debug!(used = self.used, delta = n, "Storage counter decremented");
        self.used
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Leaves that can still be added before the limit is reached
    pub fn remaining(&self) -> u64 {
        self.capacity.saturating_sub(self.used)
    }
}

/// Whether `path` names a stored leaf
pub fn is_leaf(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(LEAF_EXTENSION)
}

/// Count leaf files under `dir` (recursively). A missing directory holds no leaves.
pub fn count_leaves(dir: &Path) -> Result<u64> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in walkdir::WalkDir::new(dir) {
        let entry =
            entry.with_context(|| format!("Failed to walk storage tree: {}", dir.display()))?;
        if entry.file_type().is_file() && is_leaf(entry.path()) {
            count += 1;
        }
    }

    Ok(count)
}
