//! Lazy, error-tolerant directory traversal.
//!
//! [`PathWalker`] wraps `walkdir` with the policies every engine relies on:
//! symbolic links are reported but never descended into (so link cycles
//! cannot loop), unreadable subtrees are skipped without aborting the walk,
//! and children are visited in file-name order so repeated walks over an
//! unchanged tree produce the same sequence.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::FileEntry;

/// Traversal options shared by every engine that walks a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Yield (and descend into) entries whose name starts with `.`.
    pub show_hidden: bool,
    /// Descend below the root's immediate children.
    pub recursive: bool,
    /// Yield a directory only after all of its contents (post-order).
    pub contents_first: bool,
    /// Directory names that are pruned wherever they appear.
    pub excluded_dirs: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            show_hidden: false,
            recursive: true,
            contents_first: false,
            excluded_dirs: Vec::new(),
        }
    }
}

impl WalkOptions {
    /// Options that visit everything, used when the walk must be exhaustive
    /// (bulk operations, archives, size totals).
    pub fn everything() -> Self {
        Self {
            show_hidden: true,
            ..Self::default()
        }
    }
}

/// Depth-first walker over a directory tree.
///
/// # Examples
///
/// ```no_run
/// use filekit_core::fs::walk::{PathWalker, WalkOptions};
/// use std::path::Path;
///
/// let walker = PathWalker::new(WalkOptions::default());
/// for entry in walker.walk(Path::new("/home/user")).unwrap() {
///     println!("{}", entry.path().display());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathWalker {
    options: WalkOptions,
}

impl PathWalker {
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Starts a walk below `root`. The root itself is not yielded.
    ///
    /// Nothing is read until the returned iterator is advanced, and nothing
    /// is cached: each call re-reads the filesystem.
    ///
    /// # Errors
    ///
    /// Only the root is checked eagerly:
    /// - [`CoreError::NotFound`] — the root does not exist.
    /// - [`CoreError::NotADirectory`] — the root is not a directory.
    /// - [`CoreError::PermissionDenied`] — the root cannot be listed.
    pub fn walk(&self, root: &Path) -> CoreResult<Walk> {
        check_root(root)?;

        let mut walk_dir = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .contents_first(self.options.contents_first)
            .sort_by_file_name();
        if !self.options.recursive {
            walk_dir = walk_dir.max_depth(1);
        }

        let options = self.options.clone();
        let predicate: EntryPredicate = Box::new(move |entry| keep_entry(entry, &options));

        Ok(Walk {
            inner: walk_dir.into_iter().filter_entry(predicate),
            record_skipped: false,
            skipped: Vec::new(),
        })
    }
}

type EntryPredicate = Box<dyn FnMut(&DirEntry) -> bool + Send>;

/// Iterator returned by [`PathWalker::walk`].
pub struct Walk {
    inner: walkdir::FilterEntry<walkdir::IntoIter, EntryPredicate>,
    record_skipped: bool,
    skipped: Vec<(PathBuf, CoreError)>,
}

impl Walk {
    /// Keeps the errors of skipped entries and subtrees for
    /// [`Walk::take_skipped`] instead of only logging them.
    #[must_use]
    pub fn recording_skipped(mut self) -> Self {
        self.record_skipped = true;
        self
    }

    /// Drains what was skipped since the last call. Always empty unless
    /// [`Walk::recording_skipped`] was set.
    pub fn take_skipped(&mut self) -> Vec<(PathBuf, CoreError)> {
        std::mem::take(&mut self.skipped)
    }

    fn skip(&mut self, path: PathBuf, err: CoreError) {
        if self.record_skipped {
            self.skipped.push((path, err));
        }
    }
}

impl Iterator for Walk {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        loop {
            match self.inner.next()? {
                Ok(dir_entry) => match dir_entry.metadata() {
                    Ok(metadata) => return Some(FileEntry::new(dir_entry.into_path(), &metadata)),
                    Err(err) => {
                        tracing::debug!(path = %dir_entry.path().display(), error = %err, "skipping entry without metadata");
                        let path = dir_entry.into_path();
                        let err = walk_error(err, &path);
                        self.skip(path, err);
                    }
                },
                Err(err) => {
                    tracing::debug!(path = ?err.path(), error = %err, "skipping unreadable subtree");
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let err = walk_error(err, &path);
                    self.skip(path, err);
                }
            }
        }
    }
}

fn walk_error(err: walkdir::Error, path: &Path) -> CoreError {
    let message = err.to_string();
    match err.into_io_error() {
        Some(io) => CoreError::from_io(io, path),
        None => CoreError::Io(std::io::Error::other(message)),
    }
}

fn keep_entry(entry: &DirEntry, options: &WalkOptions) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if !options.show_hidden && name.starts_with('.') {
        return false;
    }
    if entry.file_type().is_dir() && options.excluded_dirs.iter().any(|d| d == name.as_ref()) {
        return false;
    }
    true
}

fn check_root(root: &Path) -> CoreResult<()> {
    let metadata = std::fs::metadata(root).map_err(|e| CoreError::from_io(e, root))?;
    if !metadata.is_dir() {
        return Err(CoreError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|e| CoreError::from_io(e, root))?;
    Ok(())
}

/// Sums the sizes of all regular files below `path`.
///
/// Hidden files are included and symbolic links are not followed.
/// Unreadable subtrees contribute nothing.
///
/// # Errors
///
/// Same root errors as [`PathWalker::walk`].
pub fn calculate_directory_size(path: &Path) -> CoreResult<u64> {
    let walker = PathWalker::new(WalkOptions::everything());
    Ok(walker
        .walk(path)?
        .filter(FileEntry::is_file)
        .map(|e| e.size())
        .sum())
}
