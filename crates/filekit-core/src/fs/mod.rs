//! File system engines for filekit.
//!
//! Everything here is built on [`walk::PathWalker`]: lazy traversal that
//! never follows symbolic links and skips unreadable subtrees. On top of it
//! sit content fingerprints ([`hash`]), duplicate detection
//! ([`duplicates`]), zip archives ([`archive`]), single-entry primitives
//! ([`ops`]) and batched copy/move/delete ([`bulk`]).

pub mod archive;
pub mod bulk;
pub mod duplicates;
pub mod entry;
pub mod hash;
pub mod ops;
pub mod walk;

pub use archive::{ArchiveCodec, ArchiveFormat, ArchiveJob, ArchiveJobKind};
pub use bulk::{
    BulkExecutor, ConflictPolicy, OperationKind, OperationProgress, OperationRequest,
    OperationResult,
};
pub use duplicates::{total_reclaimable, DuplicateDetector, DuplicateGroup, ScanProgress};
pub use hash::{Fingerprint, HashingEngine};
pub use walk::{calculate_directory_size, PathWalker, Walk, WalkOptions};
