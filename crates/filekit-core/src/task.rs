//! Background jobs with cancellation and event streams.
//!
//! Each `start_*` function moves an engine onto tokio's blocking pool and
//! returns a [`TaskHandle`]. The handle owns the job's cancellation token,
//! the receiving end of its event channel and the worker's join handle, so
//! the frontend never blocks on filesystem work.
//!
//! These functions must be called from inside a tokio runtime.
//!
//! Dropping a handle cancels a search or duplicate scan, which only
//! produce events. A bulk operation keeps running to the end.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::event::{OperationEvent, ProgressUpdate, ScanEvent, SearchEvent};
use crate::fs::bulk::{BulkExecutor, OperationRequest, OperationResult};
use crate::fs::duplicates::{DuplicateDetector, DuplicateGroup};
use crate::search::engine::{Search, SearchEngine, SearchOutcome};
use crate::search::query::SearchQuery;

/// A running background job producing events of type `E` and a final `T`.
pub struct TaskHandle<E, T> {
    token: CancellationToken,
    events: UnboundedReceiver<E>,
    join: JoinHandle<CoreResult<T>>,
}

pub type OperationHandle = TaskHandle<OperationEvent, OperationResult>;
pub type SearchHandle = TaskHandle<SearchEvent, SearchOutcome>;
pub type DuplicateScanHandle = TaskHandle<ScanEvent, Vec<DuplicateGroup>>;

impl<E, T> TaskHandle<E, T> {
    /// Asks the worker to stop at its next safe point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A clone of the job's token, e.g. to cancel from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Next event, or `None` once the worker has finished and the
    /// channel is drained.
    pub async fn next_event(&mut self) -> Option<E> {
        self.events.recv().await
    }

    /// Waits for the worker and returns its final value. Events that were
    /// not consumed are discarded.
    ///
    /// # Errors
    ///
    /// - Whatever the engine returned.
    /// - [`CoreError::TaskFailed`] if the worker panicked or was aborted.
    pub async fn wait(self) -> CoreResult<T> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(CoreError::TaskFailed(err.to_string())),
        }
    }
}

/// Anything that can be cancelled from the outside.
pub trait Cancel {
    fn cancel(&self);
}

impl<E, T> Cancel for TaskHandle<E, T> {
    fn cancel(&self) {
        self.token.cancel();
    }
}

/// Cancels any job handle.
pub fn cancel(handle: &impl Cancel) {
    handle.cancel();
}

/// Runs `request` on the blocking pool.
///
/// # Errors
///
/// The request is validated before the worker starts; see
/// [`BulkExecutor::execute`] for the checks.
pub fn start_bulk_operation(
    executor: BulkExecutor,
    request: OperationRequest,
) -> CoreResult<OperationHandle> {
    request.validate()?;
    Ok(spawn_bulk(executor, request, CancellationToken::new()))
}

fn spawn_bulk(
    executor: BulkExecutor,
    request: OperationRequest,
    token: CancellationToken,
) -> OperationHandle {
    let (tx, events) = mpsc::unbounded_channel();
    let worker_token = token.clone();
    let join = tokio::task::spawn_blocking(move || {
        let mut sent = 0;
        let result = executor.execute(&request, &worker_token, |progress| {
            let update = ProgressUpdate::since(progress, sent);
            sent = update.failed;
            let _ = tx.send(OperationEvent::Progress(update));
        })?;
        let _ = tx.send(OperationEvent::Finished(result.clone()));
        Ok(result)
    });
    TaskHandle {
        token,
        events,
        join,
    }
}

/// Starts `query` below `root` on the blocking pool, streaming results.
///
/// # Errors
///
/// Pattern and root errors are reported here, before the worker starts.
pub fn start_search(
    engine: SearchEngine,
    root: &Path,
    query: &SearchQuery,
) -> CoreResult<SearchHandle> {
    spawn_search(engine, root, query, CancellationToken::new())
}

fn spawn_search(
    engine: SearchEngine,
    root: &Path,
    query: &SearchQuery,
    token: CancellationToken,
) -> CoreResult<SearchHandle> {
    let search = engine.search(root, query, &token)?;
    let (tx, events) = mpsc::unbounded_channel();
    let worker_token = token.clone();
    let join = tokio::task::spawn_blocking(move || run_search(search, &worker_token, &tx));
    Ok(TaskHandle {
        token,
        events,
        join,
    })
}

fn run_search(
    mut search: Search,
    token: &CancellationToken,
    tx: &UnboundedSender<SearchEvent>,
) -> CoreResult<SearchOutcome> {
    for result in search.by_ref() {
        if tx.send(SearchEvent::Found(result)).is_err() && !token.is_cancelled() {
            tracing::debug!("search handle dropped, cancelling");
            token.cancel();
        }
    }
    let outcome = search
        .outcome()
        .ok_or_else(|| CoreError::TaskFailed("search ended without an outcome".into()))?;
    let _ = tx.send(SearchEvent::Finished(outcome));
    Ok(outcome)
}

/// Scans `root` for duplicates on the blocking pool.
///
/// Root errors surface through [`TaskHandle::wait`]; a cancelled scan
/// ends with [`CoreError::Cancelled`].
pub fn start_duplicate_scan(detector: DuplicateDetector, root: PathBuf) -> DuplicateScanHandle {
    spawn_scan(detector, root, CancellationToken::new())
}

fn spawn_scan(
    detector: DuplicateDetector,
    root: PathBuf,
    token: CancellationToken,
) -> DuplicateScanHandle {
    let (tx, events) = mpsc::unbounded_channel();
    let worker_token = token.clone();
    let join = tokio::task::spawn_blocking(move || run_scan(&detector, &root, &worker_token, &tx));
    TaskHandle {
        token,
        events,
        join,
    }
}

fn run_scan(
    detector: &DuplicateDetector,
    root: &Path,
    token: &CancellationToken,
    tx: &UnboundedSender<ScanEvent>,
) -> CoreResult<Vec<DuplicateGroup>> {
    let groups = detector.find_duplicates_with_progress(root, token, |progress| {
        if tx.send(ScanEvent::Progress(progress.clone())).is_err() && !token.is_cancelled() {
            tracing::debug!("scan handle dropped, cancelling");
            token.cancel();
        }
    })?;
    let _ = tx.send(ScanEvent::Finished {
        groups: groups.clone(),
    });
    Ok(groups)
}
