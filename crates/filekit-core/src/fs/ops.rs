//! Single-entry filesystem primitives.
//!
//! These functions touch exactly one entry each. Recursion, conflict
//! policies and progress reporting live in [`crate::fs::bulk`].

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::FileEntry;

/// Reads the immediate contents of a directory and returns them as [`FileEntry`] values.
///
/// The returned entries are sorted by name. Hidden entries are included;
/// filtering is left to the caller.
///
/// # Errors
///
/// - [`CoreError::NotFound`] — the path does not exist.
/// - [`CoreError::NotADirectory`] — the path is not a directory.
/// - [`CoreError::PermissionDenied`] — read access is denied.
/// - [`CoreError::Io`] — any other I/O error.
///
/// # Examples
///
/// ```no_run
/// use filekit_core::read_directory;
/// use std::path::Path;
///
/// let entries = read_directory(Path::new("/home/user")).unwrap();
/// for entry in &entries {
///     println!("{}", entry.name());
/// }
/// ```
pub fn read_directory(path: &Path) -> CoreResult<Vec<FileEntry>> {
    let metadata = fs::metadata(path).map_err(|e| CoreError::from_io(e, path))?;
    if !metadata.is_dir() {
        return Err(CoreError::NotADirectory(path.to_path_buf()));
    }

    let read_dir = fs::read_dir(path).map_err(|e| CoreError::from_io(e, path))?;

    let mut entries: Vec<FileEntry> = read_dir
        .filter_map(Result::ok)
        .filter_map(|dir_entry| {
            let entry_path = dir_entry.path();
            fs::symlink_metadata(&entry_path)
                .ok()
                .map(|m| FileEntry::new(entry_path, &m))
        })
        .collect();
    entries.sort_by(|a, b| a.name().cmp(b.name()));

    Ok(entries)
}

/// Creates an empty directory named `name` inside `parent`.
///
/// # Errors
///
/// - [`CoreError::InvalidName`] if `name` is not a plain file name.
/// - [`CoreError::AlreadyExists`] if the entry exists.
/// - [`CoreError::NotFound`] if `parent` does not exist.
pub fn create_directory(parent: &Path, name: &str) -> CoreResult<PathBuf> {
    let path = child_path(parent, name)?;
    fs::create_dir(&path).map_err(|e| CoreError::from_io(e, &path))?;
    Ok(path)
}

/// Creates an empty file named `name` inside `parent`. Never truncates an
/// existing file.
///
/// # Errors
///
/// Same as [`create_directory`].
pub fn create_file(parent: &Path, name: &str) -> CoreResult<PathBuf> {
    let path = child_path(parent, name)?;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| CoreError::from_io(e, &path))?;
    Ok(path)
}

/// Renames a file or directory within the same parent directory.
///
/// The `new_name` must be a valid file name (no path separators, not empty,
/// not `.` or `..`). An existing entry with the new name is never replaced.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `path` does not exist.
/// - [`CoreError::InvalidName`] if `new_name` is invalid.
/// - [`CoreError::AlreadyExists`] if `new_name` is taken.
/// - [`CoreError::Io`] for any other I/O failure.
pub fn rename_entry(path: &Path, new_name: &str) -> CoreResult<PathBuf> {
    fs::symlink_metadata(path).map_err(|e| CoreError::from_io(e, path))?;

    let parent = path
        .parent()
        .ok_or_else(|| CoreError::InvalidName("no parent directory".to_string()))?;
    let new_path = child_path(parent, new_name)?;

    if new_path == path {
        return Ok(new_path);
    }
    if fs::symlink_metadata(&new_path).is_ok() {
        return Err(CoreError::AlreadyExists(new_path));
    }

    fs::rename(path, &new_path).map_err(|e| CoreError::from_io(e, path))?;
    Ok(new_path)
}

/// Removes one entry: a file, a symbolic link (not its target) or an
/// **empty** directory.
///
/// # Errors
///
/// - [`CoreError::NotFound`] if `path` does not exist.
/// - [`CoreError::Io`] if a directory still has contents.
pub fn remove_entry(path: &Path) -> CoreResult<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| CoreError::from_io(e, path))?;
    let result = if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| CoreError::from_io(e, path))
}

/// Removes whatever occupies `path`, recursively for directories.
/// Used when an overwrite policy replaces an existing destination.
pub(crate) fn remove_tree(path: &Path) -> CoreResult<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| CoreError::from_io(e, path))?;
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| CoreError::from_io(e, path))
}

/// Copies one regular file to `dest`, preserving permissions and the
/// modification time.
///
/// A failed copy removes whatever was written to `dest`. Failing to restore
/// the modification time is logged, not returned.
///
/// # Errors
///
/// - [`CoreError::NotFound`] / [`CoreError::PermissionDenied`] for `src`.
/// - [`CoreError::InvalidRequest`] if `src` is a FIFO, socket or device node.
/// - [`CoreError::StorageFull`] and friends for `dest`.
pub fn copy_file(src: &Path, dest: &Path) -> CoreResult<()> {
    let metadata = fs::metadata(src).map_err(|e| CoreError::from_io(e, src))?;
    // fs::copy would open a FIFO and block until a writer shows up.
    if !metadata.is_file() {
        return Err(CoreError::InvalidRequest(format!(
            "{} is not a regular file",
            src.display()
        )));
    }

    if let Err(err) = fs::copy(src, dest) {
        if let Err(cleanup) = fs::remove_file(dest) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %dest.display(), error = %cleanup, "failed to remove partial copy");
            }
        }
        // The error may concern either side; blame the source if it cannot be opened.
        let blame = if File::open(src).is_err() { src } else { dest };
        return Err(CoreError::from_io(err, blame));
    }

    if let Ok(modified) = metadata.modified() {
        let restored = OpenOptions::new()
            .write(true)
            .open(dest)
            .and_then(|f: File| f.set_modified(modified));
        if let Err(err) = restored {
            tracing::debug!(path = %dest.display(), error = %err, "could not preserve modification time");
        }
    }

    Ok(())
}

/// Recreates the symbolic link `src` at `dest` without following it.
pub fn copy_symlink(src: &Path, dest: &Path) -> CoreResult<()> {
    let target = fs::read_link(src).map_err(|e| CoreError::from_io(e, src))?;
    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, dest).map_err(|e| CoreError::from_io(e, dest))?;
    #[cfg(windows)]
    {
        let result = if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
            std::os::windows::fs::symlink_dir(&target, dest)
        } else {
            std::os::windows::fs::symlink_file(&target, dest)
        };
        result.map_err(|e| CoreError::from_io(e, dest))?;
    }
    Ok(())
}

fn child_path(parent: &Path, name: &str) -> CoreResult<PathBuf> {
    if !is_valid_filename(name) {
        return Err(CoreError::InvalidName(name.to_string()));
    }
    Ok(parent.join(name))
}

pub(crate) fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\0') {
        return false;
    }
    #[cfg(windows)]
    if name.contains('\\') || name.contains(':') {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn read_directory_returns_sorted_entries() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("file2.txt"), "world").unwrap();
        fs::write(tmp.path().join("file1.txt"), "hello").unwrap();
        fs::create_dir(tmp.path().join("subdir")).unwrap();

        let entries = read_directory(tmp.path()).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["file1.txt", "file2.txt", "subdir"]);
    }

    #[test]
    fn read_directory_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(read_directory(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn read_directory_nonexistent_returns_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = read_directory(&tmp.path().join("does/not/exist"));
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
    }

    #[test]
    fn read_directory_on_file_returns_not_a_directory() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("not_a_dir.txt");
        fs::write(&file_path, "content").unwrap();

        let result = read_directory(&file_path);
        assert!(matches!(result.unwrap_err(), CoreError::NotADirectory(_)));
    }

    #[test]
    fn read_directory_includes_hidden_and_skips_nested() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".hidden"), "").unwrap();
        fs::create_dir(tmp.path().join("subdir")).unwrap();
        fs::write(tmp.path().join("subdir").join("nested.txt"), "").unwrap();

        let entries = read_directory(tmp.path()).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec![".hidden", "subdir"]);
        assert!(entries[0].is_hidden());
        assert!(entries[1].is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn read_directory_reports_symlinks_as_links() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("real.txt");
        fs::write(&target, "data").unwrap();
        std::os::unix::fs::symlink(&target, tmp.path().join("link.txt")).unwrap();

        let entries = read_directory(tmp.path()).unwrap();

        let link = entries.iter().find(|e| e.name() == "link.txt").unwrap();
        assert!(link.is_symlink());
    }

    #[test]
    fn create_directory_and_file() {
        let tmp = TempDir::new().unwrap();

        let dir = create_directory(tmp.path(), "docs").unwrap();
        let file = create_file(&dir, "readme.md").unwrap();

        assert!(dir.is_dir());
        assert!(file.is_file());
        assert_eq!(fs::read(&file).unwrap().len(), 0);
    }

    #[test]
    fn create_file_never_truncates() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.txt"), "precious").unwrap();

        let err = create_file(tmp.path(), "keep.txt").unwrap_err();

        assert!(matches!(err, CoreError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(tmp.path().join("keep.txt")).unwrap(), "precious");
    }

    #[test]
    fn create_rejects_invalid_names() {
        let tmp = TempDir::new().unwrap();
        for bad in ["", ".", "..", "a/b", "nul\0byte"] {
            assert!(matches!(
                create_directory(tmp.path(), bad).unwrap_err(),
                CoreError::InvalidName(_)
            ));
        }
    }

    #[test]
    fn rename_entry_regular() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("old_name.txt");
        fs::write(&file, "content").unwrap();

        let new_path = rename_entry(&file, "new_name.txt").unwrap();

        assert!(!file.exists());
        assert_eq!(new_path, tmp.path().join("new_name.txt"));
        assert_eq!(fs::read_to_string(&new_path).unwrap(), "content");
    }

    #[test]
    fn rename_entry_unicode_name() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("old_dir");
        fs::create_dir(&dir).unwrap();

        rename_entry(&dir, "폴더").unwrap();

        assert!(tmp.path().join("폴더").is_dir());
    }

    #[test]
    fn rename_entry_nonexistent_returns_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = rename_entry(&tmp.path().join("nope.txt"), "new.txt");
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
    }

    #[test]
    fn rename_entry_invalid_names() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "").unwrap();

        for bad in ["", ".", "..", "bad/name", "bad\0name"] {
            assert!(matches!(
                rename_entry(&file, bad).unwrap_err(),
                CoreError::InvalidName(_)
            ));
        }
        assert!(file.exists());
    }

    #[test]
    fn rename_entry_refuses_to_clobber() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.txt");
        fs::write(&a, "a").unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();

        let err = rename_entry(&a, "b.txt").unwrap_err();

        assert!(matches!(err, CoreError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(tmp.path().join("b.txt")).unwrap(), "b");
    }

    #[test]
    fn remove_entry_file_and_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("f.txt");
        let dir = tmp.path().join("d");
        fs::write(&file, "").unwrap();
        fs::create_dir(&dir).unwrap();

        remove_entry(&file).unwrap();
        remove_entry(&dir).unwrap();

        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn remove_entry_refuses_non_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("d");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("inside.txt"), "").unwrap();

        assert!(remove_entry(&dir).is_err());
        assert!(dir.join("inside.txt").exists());
    }

    #[test]
    fn remove_entry_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = remove_entry(&tmp.path().join("gone")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn remove_entry_removes_link_not_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep.txt"), "").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        remove_entry(&link).unwrap();

        assert!(fs::symlink_metadata(&link).is_err());
        assert!(target.join("keep.txt").exists());
    }

    #[test]
    fn copy_file_preserves_content_and_mtime() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.txt");
        let dest = tmp.path().join("dest.txt");
        fs::write(&src, "content").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(past)
            .unwrap();

        copy_file(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "content");
        let copied = fs::metadata(&dest).unwrap().modified().unwrap();
        let original = fs::metadata(&src).unwrap().modified().unwrap();
        assert_eq!(copied, original);
    }

    #[cfg(unix)]
    #[test]
    fn copy_file_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("script.sh");
        let dest = tmp.path().join("copy.sh");
        fs::write(&src, "#!/bin/sh").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o750)).unwrap();

        copy_file(&src, &dest).unwrap();

        let mode = fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
    }

    #[test]
    fn copy_file_nonexistent_src_returns_not_found() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dest.txt");
        let result = copy_file(&tmp.path().join("nope.txt"), &dest);
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn copy_file_refuses_named_pipe() {
        let tmp = TempDir::new().unwrap();
        let pipe = tmp.path().join("pipe");
        crate::test_support::make_fifo(&pipe);
        let dest = tmp.path().join("dest");

        let (p, d) = (pipe.clone(), dest.clone());
        let result = crate::test_support::within_timeout(move || copy_file(&p, &d));

        assert!(matches!(result.unwrap_err(), CoreError::InvalidRequest(_)));
        assert!(!dest.exists());
    }

    #[cfg(unix)]
    #[test]
    fn copy_symlink_copies_link_itself() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("target.txt"), "data").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink("target.txt", &link).unwrap();
        let copy = tmp.path().join("link-copy");

        copy_symlink(&link, &copy).unwrap();

        assert!(fs::symlink_metadata(&copy).unwrap().is_symlink());
        assert_eq!(fs::read_link(&copy).unwrap(), Path::new("target.txt"));
    }
}
