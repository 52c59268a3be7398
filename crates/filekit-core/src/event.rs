//! Events delivered from background workers to the frontend.
//!
//! Each background job in [`crate::task`] owns a channel of one of these
//! types. Events for a single job arrive in the order they happened; the
//! final event of every stream is its `Finished` variant, unless the
//! worker failed outright (then the handle's `wait` reports the error).

use std::path::PathBuf;

use serde::Serialize;

use crate::error::OperationFailure;
use crate::fs::bulk::{OperationProgress, OperationResult};
use crate::fs::duplicates::{DuplicateGroup, ScanProgress};
use crate::search::engine::{SearchOutcome, SearchResult};

/// Progress of a bulk copy, move or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OperationEvent {
    /// One unit finished.
    Progress(ProgressUpdate),
    Finished(OperationResult),
}

impl OperationEvent {
    /// Failures new in a progress event, or every failure of the batch in
    /// the finished event.
    pub fn failures(&self) -> &[OperationFailure] {
        match self {
            Self::Progress(p) => &p.new_failures,
            Self::Finished(r) => &r.failures,
        }
    }
}

/// An [`OperationProgress`] as sent over a channel. Each failure is sent
/// once, with the first update after it happened, so an update stays small
/// however many units failed before it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub processed: u64,
    pub estimated_total: u64,
    pub current: PathBuf,
    /// Failures so far, including `new_failures`.
    pub failed: usize,
    pub new_failures: Vec<OperationFailure>,
}

impl ProgressUpdate {
    /// Builds the update for `progress` when its first `already_sent`
    /// failures went out with earlier updates.
    pub fn since(progress: &OperationProgress, already_sent: usize) -> Self {
        let new_failures = progress
            .errors
            .get(already_sent..)
            .map(<[OperationFailure]>::to_vec)
            .unwrap_or_default();
        Self {
            processed: progress.processed,
            estimated_total: progress.estimated_total,
            current: progress.current.clone(),
            failed: progress.errors.len(),
            new_failures,
        }
    }
}

/// Results of a search, streamed as they are found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SearchEvent {
    Found(SearchResult),
    Finished(SearchOutcome),
}

/// Progress of a duplicate scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress(ScanProgress),
    Finished { groups: Vec<DuplicateGroup> },
}
