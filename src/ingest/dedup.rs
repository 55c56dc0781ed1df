//! At-most-once dispatch gate keyed by file path.
//!
//! Entries are never evicted: memory grows with the number of distinct files
//! seen over the lifetime of the watcher.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Thread-safe set of file paths already claimed for processing.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`. Returns `true` only for the first caller, ever.
    pub fn claim(&self, path: &Path) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.contains(path) {
            return false;
        }
        claimed.insert(path.to_path_buf())
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path)
    }

    /// Number of distinct paths claimed so far.
    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
