//! File entry representation.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use super::hash::Fingerprint;

/// A single file or directory entry, as observed during one traversal.
///
/// Entries are never cached across calls: every walk re-reads metadata from
/// disk. Directory sizes are reported as `0`; use
/// [`crate::fs::walk::calculate_directory_size`] for the size of a tree.
///
/// # Examples
///
/// ```no_run
/// use filekit_core::FileEntry;
/// use std::fs;
///
/// let metadata = fs::symlink_metadata("Cargo.toml").unwrap();
/// let entry = FileEntry::new("Cargo.toml".into(), &metadata);
/// assert_eq!(entry.name(), "Cargo.toml");
/// assert!(!entry.is_dir());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    path: PathBuf,
    name: String,
    size: u64,
    modified: Option<SystemTime>,
    is_dir: bool,
    is_file: bool,
    is_hidden: bool,
    is_symlink: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<Fingerprint>,
}

impl FileEntry {
    /// Creates a new `FileEntry` from a path and its metadata.
    ///
    /// Pass `symlink_metadata` to describe a link itself rather than its target.
    /// Hidden files are detected by a leading `.` in the file name.
    pub fn new(path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().nfc().collect::<String>())
            .unwrap_or_default();
        let is_hidden = name.starts_with('.');

        Self {
            path,
            name,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified().ok(),
            is_dir: metadata.is_dir(),
            is_file: metadata.file_type().is_file(),
            is_hidden,
            is_symlink: metadata.is_symlink(),
            fingerprint: None,
        }
    }

    /// Returns a copy of this entry carrying its content fingerprint.
    #[must_use]
    pub fn with_fingerprint(self, fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint: Some(fingerprint),
            ..self
        }
    }

    /// Returns the full path of this entry.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the NFC-normalised file or directory name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file size in bytes. Always `0` for directories.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the last-modified time, if available.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Returns `true` if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Returns `true` for regular files only. Directories, symlinks,
    /// FIFOs, sockets and device nodes are all `false`.
    pub fn is_file(&self) -> bool {
        self.is_file
    }

    /// Returns `true` if the name starts with `.`.
    pub fn is_hidden(&self) -> bool {
        self.is_hidden
    }

    /// Returns `true` if this entry is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.is_symlink
    }

    /// The cached content fingerprint, set only by the duplicate detector.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn file_entry_from_regular_file() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("test.txt");
        fs::write(&file_path, "hello").unwrap();

        let metadata = fs::symlink_metadata(&file_path).unwrap();
        let entry = FileEntry::new(file_path.clone(), &metadata);

        assert_eq!(entry.name(), "test.txt");
        assert_eq!(entry.size(), 5);
        assert!(entry.is_file());
        assert!(!entry.is_dir());
        assert!(!entry.is_hidden());
        assert!(!entry.is_symlink());
        assert_eq!(entry.path(), file_path);
        assert!(entry.modified().is_some());
        assert!(entry.fingerprint().is_none());
    }

    #[test]
    fn file_entry_from_directory() {
        let tmp = TempDir::new().unwrap();
        let dir_path = tmp.path().join("subdir");
        fs::create_dir(&dir_path).unwrap();
        fs::write(dir_path.join("a.txt"), "data").unwrap();

        let metadata = fs::symlink_metadata(&dir_path).unwrap();
        let entry = FileEntry::new(dir_path, &metadata);

        assert_eq!(entry.name(), "subdir");
        assert_eq!(entry.size(), 0);
        assert!(entry.is_dir());
        assert!(!entry.is_file());
    }

    #[test]
    fn file_entry_hidden_file() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join(".hidden");
        fs::write(&file_path, "secret").unwrap();

        let metadata = fs::symlink_metadata(&file_path).unwrap();
        let entry = FileEntry::new(file_path, &metadata);

        assert!(entry.is_hidden());
        assert_eq!(entry.size(), 6);
    }

    #[cfg(unix)]
    #[test]
    fn file_entry_symlink_is_not_a_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("target.txt");
        fs::write(&target, "data").unwrap();
        let link = tmp.path().join("link.txt");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let metadata = fs::symlink_metadata(&link).unwrap();
        let entry = FileEntry::new(link, &metadata);

        assert!(entry.is_symlink());
        assert!(!entry.is_file());
    }

    #[cfg(unix)]
    #[test]
    fn file_entry_fifo_is_not_a_file() {
        let tmp = TempDir::new().unwrap();
        let pipe = tmp.path().join("pipe");
        crate::test_support::make_fifo(&pipe);

        let metadata = fs::symlink_metadata(&pipe).unwrap();
        let entry = FileEntry::new(pipe, &metadata);

        assert!(!entry.is_file());
        assert!(!entry.is_dir());
        assert!(!entry.is_symlink());
    }

    #[test]
    fn file_entry_unicode_name() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("한글파일.txt");
        fs::write(&file_path, "내용").unwrap();

        let metadata = fs::symlink_metadata(&file_path).unwrap();
        let entry = FileEntry::new(file_path, &metadata);

        assert_eq!(entry.name(), "한글파일.txt");
    }

    #[test]
    fn with_fingerprint_keeps_other_fields() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("f.bin");
        fs::write(&file_path, "abc").unwrap();

        let metadata = fs::symlink_metadata(&file_path).unwrap();
        let entry = FileEntry::new(file_path.clone(), &metadata);
        let fp = crate::fs::hash::fingerprint(&file_path).unwrap();
        let tagged = entry.clone().with_fingerprint(fp.clone());

        assert_eq!(tagged.fingerprint(), Some(&fp));
        assert_eq!(tagged.path(), entry.path());
        assert_eq!(tagged.size(), entry.size());
        assert_ne!(tagged, entry);
    }
}
