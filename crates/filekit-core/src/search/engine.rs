//! Lazy, cancellable search over a directory tree.

use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Dispatch;

use crate::error::CoreResult;
use crate::fs::entry::FileEntry;
use crate::fs::walk::{PathWalker, Walk, WalkOptions};
use crate::search::query::{CompiledQuery, MatchedPredicates, SearchQuery};

/// One match, with the predicates it satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub entry: FileEntry,
    pub matched: MatchedPredicates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Completed,
    Cancelled,
}

/// Summary of a finished search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    /// Entries evaluated against the query.
    pub scanned: u64,
    pub matched: u64,
}

/// Starts searches. Holds the logging dispatch searches run under.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    dispatch: Dispatch,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self {
            dispatch: crate::current_dispatch(),
        }
    }
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Compiles `query` and starts walking `root`. Nothing else is read
    /// until the returned [`Search`] is iterated.
    ///
    /// # Errors
    ///
    /// - [`crate::CoreError::InvalidPattern`] for a bad glob or regex.
    /// - Root errors from [`PathWalker::walk`].
    pub fn search(
        &self,
        root: &Path,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> CoreResult<Search> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let matcher = query.compile()?;
            let walker = PathWalker::new(WalkOptions {
                show_hidden: query.shows_hidden(),
                recursive: query.is_recursive(),
                ..WalkOptions::default()
            });
            let walk = walker.walk(root)?;
            tracing::info!(root = %root.display(), "search started");

            Ok(Search {
                walk,
                matcher,
                cancel: cancel.clone(),
                dispatch: self.dispatch.clone(),
                scanned: 0,
                matched: 0,
                status: None,
            })
        })
    }
}

/// Running search. Yields results in traversal order; once it returns
/// `None`, [`Search::outcome`] says whether it completed or was cancelled.
///
/// A search cannot be resumed: run the query again to start over.
pub struct Search {
    walk: Walk,
    matcher: CompiledQuery,
    cancel: CancellationToken,
    dispatch: Dispatch,
    scanned: u64,
    matched: u64,
    status: Option<SearchStatus>,
}

impl Search {
    /// `None` while results may still be produced.
    pub fn outcome(&self) -> Option<SearchOutcome> {
        self.status.map(|status| SearchOutcome {
            status,
            scanned: self.scanned,
            matched: self.matched,
        })
    }

    fn stop(&mut self, status: SearchStatus) {
        self.status = Some(status);
        tracing::info!(?status, scanned = self.scanned, matched = self.matched, "search finished");
    }
}

impl Iterator for Search {
    type Item = SearchResult;

    fn next(&mut self) -> Option<SearchResult> {
        if self.status.is_some() {
            return None;
        }
        let dispatch = self.dispatch.clone();
        tracing::dispatcher::with_default(&dispatch, || loop {
            if self.cancel.is_cancelled() {
                self.stop(SearchStatus::Cancelled);
                return None;
            }
            let Some(entry) = self.walk.next() else {
                self.stop(SearchStatus::Completed);
                return None;
            };
            self.scanned += 1;
            if let Some(matched) = self.matcher.evaluate_until(&entry, &self.cancel) {
                self.matched += 1;
                return Some(SearchResult { entry, matched });
            }
        })
    }
}
