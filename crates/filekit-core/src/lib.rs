//! filekit core library: UI-agnostic file operations and search.
//!
//! `filekit-core` holds the engines a file manager frontend drives: tree
//! traversal, bulk copy/move/delete with progress and cancellation,
//! duplicate detection, zip archives and filtered search. It owns no UI
//! state; frontends receive progress and results through callbacks or the
//! channels in [`task`].
//!
//! # Modules
//!
//! - [`fs`] — traversal, hashing, duplicates, archives, single-entry and bulk operations.
//! - [`search`] — search queries and the lazy search engine.
//! - [`task`] — background jobs with cancellation tokens and event channels.
//! - [`event`] — events delivered by background jobs.
//! - [`config`] — TOML configuration.
//! - [`error`] — unified error type ([`CoreError`]) and result alias ([`CoreResult`]).
//!
//! # Logging
//!
//! Engines log through `tracing`. Each one captures the dispatcher that is
//! current when it is constructed and runs its work under it, including on
//! background threads; override it with `with_dispatch`.

pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod search;
pub mod task;

pub use config::Config;
pub use error::{CoreError, CoreResult, ErrorKind, OperationFailure};
pub use event::{OperationEvent, ProgressUpdate, ScanEvent, SearchEvent};
pub use fs::archive::{compress, extract};
pub use fs::duplicates::find_duplicates;
pub use fs::entry::FileEntry;
pub use fs::ops::{create_directory, create_file, read_directory, remove_entry, rename_entry};
pub use fs::walk::calculate_directory_size;
pub use fs::{
    ArchiveCodec, ArchiveFormat, ArchiveJob, BulkExecutor, ConflictPolicy, DuplicateDetector,
    DuplicateGroup, Fingerprint, HashingEngine, OperationKind, OperationProgress,
    OperationRequest, OperationResult, PathWalker, WalkOptions,
};
pub use search::{SearchEngine, SearchQuery, SearchResult};
pub use task::{start_bulk_operation, start_duplicate_scan, start_search, Cancel};

/// The dispatcher engines capture at construction.
pub(crate) fn current_dispatch() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|dispatch| dispatch.clone())
}

/// Normalises a string to NFC (composed) form.
///
/// macOS stores filenames in NFD (decomposed), which makes a pattern typed
/// in composed form miss. Frontends should pass user-typed patterns
/// through this before building a [`SearchQuery`].
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nfc_string_composes_hangul() {
        let decomposed = "\u{1112}\u{1161}\u{11AB}";
        assert_eq!(nfc_string(decomposed), "한");
    }

    #[test]
    fn nfc_string_leaves_ascii_alone() {
        assert_eq!(nfc_string("report_q3.txt"), "report_q3.txt");
    }
}
