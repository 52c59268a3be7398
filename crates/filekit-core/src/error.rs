//! Error types for `filekit-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`. Batch engines never raise
//! per-item errors; they record them as [`OperationFailure`] values, which
//! carry an [`ErrorKind`] instead of the error itself so results stay
//! `Clone` and serializable.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Unified error type for all core operations.
///
/// Each variant captures just enough context for the caller to display
/// a meaningful message or take corrective action.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target path does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// A directory was expected but the path points to something else.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The destination already exists and the conflict policy forbids replacing it.
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    /// A rename crossed a filesystem boundary.
    #[error("cannot rename across devices: {0}")]
    CrossDeviceMove(PathBuf),

    /// The destination volume ran out of space.
    #[error("no space left on device: {0}")]
    StorageFull(PathBuf),

    /// A file or directory name is invalid (empty, contains path separators, etc.).
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A request was rejected before any work started.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A glob or regular expression failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// The destination lies inside the source being copied or moved.
    #[error("destination is inside the source: {0}")]
    InvalidDestination(PathBuf),

    /// The archive format is not one filekit can read or write.
    #[error("unsupported archive format: {0}")]
    UnsupportedArchiveFormat(String),

    /// The archive is malformed, truncated, or fails its integrity checks.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    /// Failed to parse a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// The operation was cancelled through its token.
    #[error("operation cancelled")]
    Cancelled,

    /// A background worker panicked or was aborted.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(unix)]
const EXDEV: i32 = 18;
#[cfg(unix)]
const ENOSPC: i32 = 28;
#[cfg(windows)]
const ERROR_NOT_SAME_DEVICE: i32 = 17;
#[cfg(windows)]
const ERROR_DISK_FULL: i32 = 112;

impl CoreError {
    /// Classifies an I/O error raised while working on `path`.
    ///
    /// Permission, not-found, already-exists, disk-full and cross-device
    /// conditions map to their own variants; everything else stays [`CoreError::Io`].
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        use std::io::ErrorKind as Kind;

        match err.kind() {
            Kind::NotFound => return Self::NotFound(path.to_path_buf()),
            Kind::PermissionDenied => return Self::PermissionDenied(path.to_path_buf()),
            Kind::AlreadyExists => return Self::AlreadyExists(path.to_path_buf()),
            _ => {}
        }

        match err.raw_os_error() {
            #[cfg(unix)]
            Some(EXDEV) => Self::CrossDeviceMove(path.to_path_buf()),
            #[cfg(unix)]
            Some(ENOSPC) => Self::StorageFull(path.to_path_buf()),
            #[cfg(windows)]
            Some(ERROR_NOT_SAME_DEVICE) => Self::CrossDeviceMove(path.to_path_buf()),
            #[cfg(windows)]
            Some(ERROR_DISK_FULL) => Self::StorageFull(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Returns the discriminant used in serialized failure records.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotADirectory(_) => ErrorKind::NotADirectory,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::CrossDeviceMove(_) => ErrorKind::CrossDeviceMove,
            Self::StorageFull(_) => ErrorKind::StorageFull,
            Self::InvalidName(_) | Self::InvalidRequest(_) | Self::InvalidPattern(_) => {
                ErrorKind::InvalidInput
            }
            Self::InvalidDestination(_) => ErrorKind::InvalidDestination,
            Self::UnsupportedArchiveFormat(_) => ErrorKind::UnsupportedArchiveFormat,
            Self::CorruptArchive(_) => ErrorKind::CorruptArchive,
            Self::ConfigParse(_) => ErrorKind::InvalidInput,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::TaskFailed(_) | Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Convenience alias used throughout `filekit-core`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse error category, stable across releases and safe to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    NotADirectory,
    AlreadyExists,
    CrossDeviceMove,
    StorageFull,
    InvalidInput,
    InvalidDestination,
    UnsupportedArchiveFormat,
    CorruptArchive,
    Cancelled,
    Io,
}

/// A single item that failed inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationFailure {
    /// The source (or residual) path the failure refers to.
    pub path: PathBuf,
    pub kind: ErrorKind,
    /// Human-readable rendering of the underlying error.
    pub message: String,
}

impl OperationFailure {
    pub fn new(path: &Path, err: &CoreError) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
