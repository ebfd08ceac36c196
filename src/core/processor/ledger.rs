//! In-memory record of documents already handled in this session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Path to last-seen modification time.
///
/// Entries are never removed; a moved-away path simply never shows up
/// again.
#[derive(Debug, Default)]
pub struct ProcessedLedger {
    entries: HashMap<PathBuf, SystemTime>,
}

impl ProcessedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `path` was recorded with exactly this modification time.
    pub fn is_unchanged(&self, path: &Path, modified: SystemTime) -> bool {
        self.entries.get(path) == Some(&modified)
    }

    pub fn record(&mut self, path: PathBuf, modified: SystemTime) {
        self.entries.insert(path, modified);
    }

    pub fn last_seen(&self, path: &Path) -> Option<SystemTime> {
        self.entries.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
