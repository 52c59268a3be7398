//! Content-based duplicate detection.
//!
//! [`DuplicateDetector`] makes a single pass over a tree, fingerprints every
//! regular file, and groups files whose fingerprints collide. It only
//! reports; removing duplicates is left to the caller (typically through a
//! [`crate::fs::bulk::BulkExecutor`] delete request).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::FileEntry;
use crate::fs::hash::{Fingerprint, HashingEngine};
use crate::fs::walk::{PathWalker, WalkOptions};

/// Reported after each file a scan examines, hashed or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    pub examined: u64,
    pub current: PathBuf,
}

/// A set of two or more files with identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    fingerprint: Fingerprint,
    size: u64,
    entries: Vec<FileEntry>,
    reclaimable_bytes: u64,
}

impl DuplicateGroup {
    fn pair(fingerprint: Fingerprint, first: FileEntry, second: FileEntry) -> Self {
        Self {
            fingerprint,
            size: first.size(),
            reclaimable_bytes: second.size(),
            entries: vec![first, second],
        }
    }

    fn push(&mut self, entry: FileEntry) {
        self.reclaimable_bytes += entry.size();
        self.entries.push(entry);
    }

    /// The shared content fingerprint.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Size of the first member in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Members in traversal order (always two or more).
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; present for API symmetry with [`Self::len`].
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes freed by keeping one member and deleting the rest.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.reclaimable_bytes
    }
}

/// Total bytes reclaimable across all groups.
pub fn total_reclaimable(groups: &[DuplicateGroup]) -> u64 {
    groups.iter().map(DuplicateGroup::reclaimable_bytes).sum()
}

enum Slot {
    First(FileEntry),
    Group(usize),
}

/// Finds files with identical content under a root directory.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    walk_options: WalkOptions,
    hasher: HashingEngine,
    dispatch: Dispatch,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(WalkOptions::default())
    }
}

impl DuplicateDetector {
    pub fn new(walk_options: WalkOptions) -> Self {
        Self {
            walk_options,
            hasher: HashingEngine::new(),
            dispatch: crate::current_dispatch(),
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: HashingEngine) -> Self {
        self.hasher = hasher;
        self
    }

    /// Routes this detector's log events to `dispatch`.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Returns all duplicate groups under `root`, largest reclaimable first.
    ///
    /// Files that cannot be fingerprinted are skipped, not reported.
    ///
    /// # Errors
    ///
    /// Only an invalid or unreadable `root` is an error.
    pub fn find_duplicates(&self, root: &Path) -> CoreResult<Vec<DuplicateGroup>> {
        self.find_duplicates_cancellable(root, &CancellationToken::new())
    }

    /// Like [`Self::find_duplicates`], but checks `cancel` between files.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] once the token fires.
    pub fn find_duplicates_cancellable(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<DuplicateGroup>> {
        self.find_duplicates_with_progress(root, cancel, |_| {})
    }

    /// Like [`Self::find_duplicates_cancellable`], reporting each examined file.
    pub fn find_duplicates_with_progress<F>(
        &self,
        root: &Path,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> CoreResult<Vec<DuplicateGroup>>
    where
        F: FnMut(&ScanProgress),
    {
        tracing::dispatcher::with_default(&self.dispatch, || self.scan(root, cancel, on_progress))
    }

    fn scan<F>(
        &self,
        root: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> CoreResult<Vec<DuplicateGroup>>
    where
        F: FnMut(&ScanProgress),
    {
        let mut progress = ScanProgress::default();
        let walker = PathWalker::new(self.walk_options.clone());
        let mut index: HashMap<Fingerprint, Slot> = HashMap::new();
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        let mut hashed = 0usize;

        tracing::info!(root = %root.display(), "duplicate scan started");

        for entry in walker.walk(root)?.filter(FileEntry::is_file) {
            if cancel.is_cancelled() {
                tracing::info!(root = %root.display(), hashed, "duplicate scan cancelled");
                return Err(CoreError::Cancelled);
            }

            let hashed_fp = self.hasher.fingerprint(entry.path());
            progress.examined += 1;
            progress.current = entry.path().to_path_buf();
            on_progress(&progress);

            let fingerprint = match hashed_fp {
                Ok(fp) => fp,
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "failed to hash file");
                    continue;
                }
            };
            hashed += 1;
            let entry = entry.with_fingerprint(fingerprint.clone());

            match index.remove(&fingerprint) {
                None => {
                    index.insert(fingerprint, Slot::First(entry));
                }
                Some(Slot::First(first)) => {
                    groups.push(DuplicateGroup::pair(fingerprint.clone(), first, entry));
                    index.insert(fingerprint, Slot::Group(groups.len() - 1));
                }
                Some(Slot::Group(i)) => {
                    groups[i].push(entry);
                    index.insert(fingerprint, Slot::Group(i));
                }
            }
        }

        // Stable: ties keep the order in which groups were discovered.
        groups.sort_by(|a, b| b.reclaimable_bytes.cmp(&a.reclaimable_bytes));

        tracing::info!(
            root = %root.display(),
            hashed,
            groups = groups.len(),
            reclaimable = total_reclaimable(&groups),
            "duplicate scan finished"
        );
        Ok(groups)
    }
}

/// Finds duplicates under `root` with default options.
pub fn find_duplicates(root: &Path) -> CoreResult<Vec<DuplicateGroup>> {
    DuplicateDetector::default().find_duplicates(root)
}
