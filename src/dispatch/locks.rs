//! Per-file exclusion for concurrent edit requests.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Set of files currently being edited.
///
/// A second request for a held file is refused rather than queued; the
/// caller re-reads and retries.
#[derive(Debug, Default, Clone)]
pub struct FileLocks {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`, or `None` when another request holds it.
    pub fn try_lock(&self, path: &Path) -> Option<FileLock> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(path.to_path_buf()) {
            warn!(path = %path.display(), "file is busy, rejecting concurrent edit");
            return None;
        }
        Some(FileLock {
            path: path.to_path_buf(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }
}

/// Releases its file when dropped.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FileLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}
