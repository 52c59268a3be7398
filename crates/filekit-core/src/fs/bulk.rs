//! Batched copy, move and delete.
//!
//! [`BulkExecutor::execute`] works through an [`OperationRequest`] one
//! entry at a time. Every file, symlink and directory it touches is one
//! *unit*; after each unit it reports an [`OperationProgress`] and checks
//! the cancellation token. Per-entry failures are collected into the
//! [`OperationResult`] instead of aborting the batch, so a batch may end
//! partially applied.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

use crate::error::{CoreError, CoreResult, OperationFailure};
use crate::fs::ops;
use crate::fs::walk::{PathWalker, Walk, WalkOptions};

/// What a request does with its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
}

/// How an existing destination entry is handled.
///
/// Existing directories are always merged into; the policy applies to
/// files, symlinks and type mismatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Record an [`CoreError::AlreadyExists`] failure and move on.
    #[default]
    #[serde(rename = "fail")]
    FailOnExisting,
    /// Remove the existing entry first.
    #[serde(rename = "overwrite")]
    Overwrite,
    /// Leave the existing entry alone and count the unit as skipped.
    #[serde(rename = "skip")]
    SkipExisting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub sources: Vec<PathBuf>,
    /// Target directory for copy and move. Ignored by delete.
    pub destination: Option<PathBuf>,
    pub conflict_policy: ConflictPolicy,
}

impl OperationRequest {
    pub fn copy(sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Copy,
            sources,
            destination: Some(destination.into()),
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn move_to(sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Move,
            sources,
            destination: Some(destination.into()),
            conflict_policy: ConflictPolicy::default(),
        }
    }

    pub fn delete(sources: Vec<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Delete,
            sources,
            destination: None,
            conflict_policy: ConflictPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Runs the checks [`BulkExecutor::execute`] performs before any work.
    ///
    /// # Errors
    ///
    /// See [`BulkExecutor::execute`].
    pub fn validate(&self) -> CoreResult<()> {
        checked_destination(self).map(|_| ())
    }
}

/// Snapshot handed to the progress callback after every unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationProgress {
    /// Units finished so far, whatever their outcome. Never decreases.
    pub processed: u64,
    /// Pre-scan estimate; grows if the tree turned out larger.
    pub estimated_total: u64,
    /// The entry the last unit worked on.
    pub current: PathBuf,
    pub errors: Vec<OperationFailure>,
}

/// Terminal value of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub succeeded: u64,
    /// Units left alone: conflicts under [`ConflictPolicy::SkipExisting`],
    /// and directories a delete kept because something inside them failed.
    pub skipped: u64,
    /// In the order they happened. May include residual failures (a moved
    /// entry whose source could not be removed) on top of failed units.
    pub failures: Vec<OperationFailure>,
    pub cancelled: bool,
    pub estimated_total: u64,
}

impl OperationResult {
    /// `true` when nothing failed and the batch ran to the end.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Runs [`OperationRequest`]s on the calling thread.
#[derive(Debug, Clone)]
pub struct BulkExecutor {
    dispatch: Dispatch,
}

impl Default for BulkExecutor {
    fn default() -> Self {
        Self {
            dispatch: crate::current_dispatch(),
        }
    }
}

impl BulkExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Executes `request`, calling `on_progress` after every unit.
    ///
    /// `cancel` is checked before each unit; a unit in flight always
    /// finishes first.
    ///
    /// # Errors
    ///
    /// Only for requests that are rejected before any work starts:
    /// - [`CoreError::InvalidRequest`] — no sources, or copy/move without a destination.
    /// - [`CoreError::NotFound`] / [`CoreError::NotADirectory`] — bad destination.
    ///
    /// Everything that goes wrong afterwards is recorded in the result.
    pub fn execute<F>(
        &self,
        request: &OperationRequest,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> CoreResult<OperationResult>
    where
        F: FnMut(&OperationProgress),
    {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let destination = checked_destination(request)?;
            let mut batch = Batch::new(request, cancel, on_progress);

            tracing::info!(
                kind = ?request.kind,
                sources = request.sources.len(),
                estimated_total = batch.progress.estimated_total,
                "bulk operation started"
            );

            for source in &request.sources {
                if batch.check_cancelled() {
                    break;
                }
                match (request.kind, destination) {
                    (OperationKind::Copy, Some(dest)) => batch.copy_source(source, dest),
                    (OperationKind::Move, Some(dest)) => batch.move_source(source, dest),
                    _ => batch.delete_source(source),
                }
            }

            let result = batch.into_result();
            tracing::info!(
                kind = ?result.kind,
                succeeded = result.succeeded,
                skipped = result.skipped,
                failed = result.failures.len(),
                cancelled = result.cancelled,
                "bulk operation finished"
            );
            Ok(result)
        })
    }
}

fn checked_destination(request: &OperationRequest) -> CoreResult<Option<&Path>> {
    if request.sources.is_empty() {
        return Err(CoreError::InvalidRequest("no source paths given".to_string()));
    }
    if request.kind == OperationKind::Delete {
        return Ok(None);
    }
    let dest = request.destination.as_deref().ok_or_else(|| {
        CoreError::InvalidRequest(format!("{:?} requires a destination", request.kind))
    })?;
    let metadata = fs::metadata(dest).map_err(|e| CoreError::from_io(e, dest))?;
    if !metadata.is_dir() {
        return Err(CoreError::NotADirectory(dest.to_path_buf()));
    }
    Ok(Some(dest))
}

/// Number of units a source expands to.
fn count_units(source: &Path) -> u64 {
    match fs::symlink_metadata(source) {
        Ok(m) if m.is_dir() => {
            let contents = PathWalker::new(WalkOptions::everything())
                .walk(source)
                .map(|walk| walk.count() as u64)
                .unwrap_or(0);
            1 + contents
        }
        _ => 1,
    }
}

enum Outcome {
    Done,
    Skipped,
    Failed(CoreError),
}

impl From<CoreResult<()>> for Outcome {
    fn from(result: CoreResult<()>) -> Self {
        match result {
            Ok(()) => Self::Done,
            Err(err) => Self::Failed(err),
        }
    }
}

/// What to do at a destination path once the conflict policy has run.
enum Slot {
    Vacant,
    /// An existing directory that a source directory merges into.
    Merge,
    Skip,
}

struct Batch<'a, F> {
    request: &'a OperationRequest,
    token: &'a CancellationToken,
    on_progress: F,
    progress: OperationProgress,
    succeeded: u64,
    skipped: u64,
    cancelled: bool,
}

impl<'a, F> Batch<'a, F>
where
    F: FnMut(&OperationProgress),
{
    fn new(request: &'a OperationRequest, token: &'a CancellationToken, on_progress: F) -> Self {
        let estimated_total = request.sources.iter().map(|s| count_units(s)).sum();
        Self {
            request,
            token,
            on_progress,
            progress: OperationProgress {
                estimated_total,
                ..OperationProgress::default()
            },
            succeeded: 0,
            skipped: 0,
            cancelled: false,
        }
    }

    fn check_cancelled(&mut self) -> bool {
        if !self.cancelled && self.token.is_cancelled() {
            tracing::info!(processed = self.progress.processed, "bulk operation cancelled");
            self.cancelled = true;
        }
        self.cancelled
    }

    fn finish(&mut self, path: &Path, outcome: Outcome) {
        self.finish_many(path, outcome, 1);
    }

    /// Records `units` units that completed in one filesystem call.
    fn finish_many(&mut self, path: &Path, outcome: Outcome, units: u64) {
        match outcome {
            Outcome::Done => self.succeeded += units,
            Outcome::Skipped => self.skipped += units,
            Outcome::Failed(err) => {
                tracing::debug!(path = %path.display(), error = %err, "unit failed");
                self.progress.errors.push(OperationFailure::new(path, &err));
            }
        }
        self.progress.processed += units;
        self.progress.estimated_total = self.progress.estimated_total.max(self.progress.processed);
        self.progress.current = path.to_path_buf();
        (self.on_progress)(&self.progress);
    }

    /// A failure that is not a unit of its own, such as a source left
    /// behind after its contents were copied.
    fn residual(&mut self, path: &Path, err: CoreError) {
        tracing::warn!(path = %path.display(), error = %err, "residual failure");
        self.progress.errors.push(OperationFailure::new(path, &err));
    }

    /// Records entries the walk could not read. Returns their paths.
    fn record_skipped(&mut self, walk: &mut Walk) -> Vec<PathBuf> {
        walk.take_skipped()
            .into_iter()
            .map(|(path, err)| {
                self.residual(&path, err);
                path
            })
            .collect()
    }

    fn into_result(self) -> OperationResult {
        OperationResult {
            kind: self.request.kind,
            succeeded: self.succeeded,
            skipped: self.skipped,
            failures: self.progress.errors,
            cancelled: self.cancelled,
            estimated_total: self.progress.estimated_total,
        }
    }

    /// Applies the conflict policy at `target`.
    fn claim(&self, target: &Path, source_is_dir: bool) -> CoreResult<Slot> {
        let existing = match fs::symlink_metadata(target) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Slot::Vacant),
            Err(e) => return Err(CoreError::from_io(e, target)),
        };
        if source_is_dir && existing.is_dir() {
            return Ok(Slot::Merge);
        }
        match self.request.conflict_policy {
            ConflictPolicy::FailOnExisting => Err(CoreError::AlreadyExists(target.to_path_buf())),
            ConflictPolicy::SkipExisting => Ok(Slot::Skip),
            ConflictPolicy::Overwrite => {
                ops::remove_tree(target)?;
                Ok(Slot::Vacant)
            }
        }
    }

    /// Resolves where `source` lands inside `dest_dir` and rejects
    /// destinations that would recurse into or clobber the source itself.
    fn target_for(&self, source: &Path, dest_dir: &Path, is_dir: bool) -> CoreResult<PathBuf> {
        let name = source
            .file_name()
            .ok_or_else(|| CoreError::InvalidName(source.display().to_string()))?;
        let canonical_dest =
            fs::canonicalize(dest_dir).map_err(|e| CoreError::from_io(e, dest_dir))?;

        if let Some(parent) = source.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            if fs::canonicalize(parent).ok().as_deref() == Some(canonical_dest.as_path()) {
                return Err(CoreError::InvalidDestination(dest_dir.to_path_buf()));
            }
        }
        if is_dir {
            let canonical_source =
                fs::canonicalize(source).map_err(|e| CoreError::from_io(e, source))?;
            if canonical_dest.starts_with(&canonical_source) {
                return Err(CoreError::InvalidDestination(dest_dir.to_path_buf()));
            }
        }
        Ok(dest_dir.join(name))
    }

    // -- copy -----------------------------------------------------------

    fn copy_source(&mut self, source: &Path, dest_dir: &Path) {
        let metadata = match fs::symlink_metadata(source) {
            Ok(m) => m,
            Err(e) => return self.finish(source, Outcome::Failed(CoreError::from_io(e, source))),
        };
        let target = match self.target_for(source, dest_dir, metadata.is_dir()) {
            Ok(t) => t,
            Err(err) => return self.finish(source, Outcome::Failed(err)),
        };

        if metadata.is_dir() {
            self.copy_tree(source, &target);
        } else {
            let outcome = self.copy_leaf(source, &target, metadata.is_symlink());
            self.finish(source, outcome);
        }
    }

    /// Copies a directory entry by entry. Descendants of a directory that
    /// could not be created or was skipped are not visited.
    fn copy_tree(&mut self, source: &Path, target: &Path) {
        let mut walk = match PathWalker::new(WalkOptions::everything()).walk(source) {
            Ok(w) => w.recording_skipped(),
            Err(err) => return self.finish(source, Outcome::Failed(err)),
        };
        let root = self.prepare_dir(target);
        let created = matches!(root, Outcome::Done);
        self.finish(source, root);
        if !created {
            return;
        }

        let mut blocked: Option<PathBuf> = None;
        while let Some(entry) = walk.next() {
            self.record_skipped(&mut walk);
            if self.check_cancelled() {
                return;
            }
            if let Some(prefix) = &blocked {
                if entry.path().starts_with(prefix) {
                    continue;
                }
                blocked = None;
            }
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            let dest = target.join(relative);

            let outcome = if entry.is_dir() {
                let outcome = self.prepare_dir(&dest);
                if !matches!(outcome, Outcome::Done) {
                    blocked = Some(entry.path().to_path_buf());
                }
                outcome
            } else {
                self.copy_leaf(entry.path(), &dest, entry.is_symlink())
            };
            self.finish(entry.path(), outcome);
        }
        self.record_skipped(&mut walk);
    }

    fn prepare_dir(&self, target: &Path) -> Outcome {
        match self.claim(target, true) {
            Ok(Slot::Merge) => Outcome::Done,
            Ok(Slot::Skip) => Outcome::Skipped,
            Ok(Slot::Vacant) => fs::create_dir(target)
                .map_err(|e| CoreError::from_io(e, target))
                .into(),
            Err(err) => Outcome::Failed(err),
        }
    }

    fn copy_leaf(&self, source: &Path, target: &Path, is_symlink: bool) -> Outcome {
        match self.claim(target, false) {
            Ok(Slot::Skip) => Outcome::Skipped,
            Ok(_) if is_symlink => ops::copy_symlink(source, target).into(),
            Ok(_) => ops::copy_file(source, target).into(),
            Err(err) => Outcome::Failed(err),
        }
    }

    // -- move -----------------------------------------------------------

    fn move_source(&mut self, source: &Path, dest_dir: &Path) {
        let metadata = match fs::symlink_metadata(source) {
            Ok(m) => m,
            Err(e) => return self.finish(source, Outcome::Failed(CoreError::from_io(e, source))),
        };
        let is_dir = metadata.is_dir();
        let target = match self.target_for(source, dest_dir, is_dir) {
            Ok(t) => t,
            Err(err) => return self.finish(source, Outcome::Failed(err)),
        };
        let units = if is_dir { count_units(source) } else { 1 };

        match self.claim(&target, is_dir) {
            Ok(Slot::Vacant) => {}
            Ok(Slot::Merge) => return self.move_tree(source, &target),
            Ok(Slot::Skip) => return self.finish_many(source, Outcome::Skipped, units),
            Err(err) => return self.finish(source, Outcome::Failed(err)),
        }

        match fs::rename(source, &target) {
            Ok(()) => self.finish_many(source, Outcome::Done, units),
            Err(e) => match CoreError::from_io(e, source) {
                CoreError::CrossDeviceMove(_) => {
                    tracing::debug!(path = %source.display(), "rename crossed devices, copying instead");
                    if is_dir {
                        self.move_tree(source, &target);
                    } else {
                        let outcome = self.copy_leaf(source, &target, metadata.is_symlink());
                        self.finish_source_removal(source, outcome);
                    }
                }
                err => self.finish(source, Outcome::Failed(err)),
            },
        }
    }

    /// Moves a directory entry by entry into `target`, then removes the
    /// emptied source directories bottom-up.
    fn move_tree(&mut self, source: &Path, target: &Path) {
        let mut walk = match PathWalker::new(WalkOptions::everything()).walk(source) {
            Ok(w) => w.recording_skipped(),
            Err(err) => return self.finish(source, Outcome::Failed(err)),
        };
        let root = self.prepare_dir(target);
        let mut clean = matches!(root, Outcome::Done);
        self.finish(source, root);
        if !clean {
            return;
        }

        let mut source_dirs = vec![source.to_path_buf()];
        let mut blocked: Option<PathBuf> = None;
        while let Some(entry) = walk.next() {
            clean &= self.record_skipped(&mut walk).is_empty();
            if self.check_cancelled() {
                return;
            }
            if let Some(prefix) = &blocked {
                if entry.path().starts_with(prefix) {
                    continue;
                }
                blocked = None;
            }
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            let dest = target.join(relative);

            if entry.is_dir() {
                let outcome = self.prepare_dir(&dest);
                if matches!(outcome, Outcome::Done) {
                    source_dirs.push(entry.path().to_path_buf());
                } else {
                    blocked = Some(entry.path().to_path_buf());
                    clean = false;
                }
                self.finish(entry.path(), outcome);
            } else {
                let outcome = self.move_leaf(entry.path(), &dest, entry.is_symlink());
                clean &= matches!(outcome, Outcome::Done);
                self.finish(entry.path(), outcome);
            }
        }
        clean &= self.record_skipped(&mut walk).is_empty();

        if !clean {
            tracing::debug!(path = %source.display(), "leaving partially moved source in place");
            return;
        }
        for dir in source_dirs.iter().rev() {
            if let Err(err) = ops::remove_entry(dir) {
                self.residual(dir, err);
            }
        }
    }

    /// Renames one non-directory entry, copying across devices.
    fn move_leaf(&mut self, source: &Path, target: &Path, is_symlink: bool) -> Outcome {
        match self.claim(target, false) {
            Ok(Slot::Skip) => return Outcome::Skipped,
            Ok(_) => {}
            Err(err) => return Outcome::Failed(err),
        }
        match fs::rename(source, target) {
            Ok(()) => Outcome::Done,
            Err(e) => match CoreError::from_io(e, source) {
                CoreError::CrossDeviceMove(_) => {
                    let copied = if is_symlink {
                        ops::copy_symlink(source, target)
                    } else {
                        ops::copy_file(source, target)
                    };
                    if let Err(err) = copied {
                        return Outcome::Failed(err);
                    }
                    if let Err(err) = ops::remove_entry(source) {
                        self.residual(source, err);
                    }
                    Outcome::Done
                }
                err => Outcome::Failed(err),
            },
        }
    }

    /// Finishes a copied single-entry source by removing the original.
    fn finish_source_removal(&mut self, source: &Path, copied: Outcome) {
        let done = matches!(copied, Outcome::Done);
        self.finish(source, copied);
        if done {
            if let Err(err) = ops::remove_entry(source) {
                self.residual(source, err);
            }
        }
    }

    // -- delete ---------------------------------------------------------

    fn delete_source(&mut self, source: &Path) {
        let metadata = match fs::symlink_metadata(source) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return self.finish(source, Outcome::Done)
            }
            Err(e) => return self.finish(source, Outcome::Failed(CoreError::from_io(e, source))),
        };
        if !metadata.is_dir() {
            let outcome = remove_if_present(source);
            return self.finish(source, outcome);
        }

        let options = WalkOptions {
            contents_first: true,
            ..WalkOptions::everything()
        };
        let mut walk = match PathWalker::new(options).walk(source) {
            Ok(w) => w.recording_skipped(),
            Err(err) => return self.finish(source, Outcome::Failed(err)),
        };
        // Paths that could not be read or removed. Their ancestors cannot
        // be emptied, so they are skipped rather than failed again.
        let mut failed = Vec::new();
        while let Some(entry) = walk.next() {
            failed.extend(self.record_skipped(&mut walk));
            if self.check_cancelled() {
                return;
            }
            let outcome = if failed.iter().any(|p| p.starts_with(entry.path())) {
                tracing::debug!(path = %entry.path().display(), "keeping directory with undeleted contents");
                Outcome::Skipped
            } else {
                remove_if_present(entry.path())
            };
            if matches!(outcome, Outcome::Failed(_)) {
                failed.push(entry.path().to_path_buf());
            }
            self.finish(entry.path(), outcome);
        }
        failed.extend(self.record_skipped(&mut walk));
        if self.check_cancelled() {
            return;
        }
        let outcome = if failed.is_empty() {
            remove_if_present(source)
        } else {
            Outcome::Skipped
        };
        self.finish(source, outcome);
    }
}

/// Removes one entry; an entry that is already gone counts as removed.
fn remove_if_present(path: &Path) -> Outcome {
    match ops::remove_entry(path) {
        Ok(()) | Err(CoreError::NotFound(_)) => Outcome::Done,
        Err(err) => Outcome::Failed(err),
    }
}
