//! Folder ⇄ archive conversion.
//!
//! Archives are zip files. Compression walks the folder with
//! [`PathWalker`] and stores every regular file and directory under its
//! path relative to the folder. Extraction validates the whole archive
//! before anything becomes visible in the destination: entries are written
//! into a hidden staging directory and only moved into place once every
//! entry has been read and checksum-verified.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::Dispatch;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{CoreError, CoreResult};
use crate::fs::walk::{PathWalker, WalkOptions};

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
}

impl ArchiveFormat {
    /// Picks the format from a path's extension (case-insensitive).
    ///
    /// # Errors
    ///
    /// [`CoreError::UnsupportedArchiveFormat`] for any other extension.
    pub fn from_path(path: &Path) -> CoreResult<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "zip" => Ok(Self::Zip),
            "" => Err(CoreError::UnsupportedArchiveFormat(format!(
                "{} has no extension",
                path.display()
            ))),
            other => Err(CoreError::UnsupportedArchiveFormat(format!(".{other}"))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
        }
    }
}

/// Direction of an [`ArchiveJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveJobKind {
    Compress,
    Extract,
}

/// A compress or extract request, resolved to a concrete format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    pub kind: ArchiveJobKind,
    /// Folder to compress, or archive to extract.
    pub source: PathBuf,
    /// Archive to write, or directory to extract into.
    pub destination: PathBuf,
    pub format: ArchiveFormat,
}

impl ArchiveJob {
    pub fn compress(folder: impl Into<PathBuf>, output: impl Into<PathBuf>) -> CoreResult<Self> {
        let destination = output.into();
        let format = ArchiveFormat::from_path(&destination)?;
        Ok(Self {
            kind: ArchiveJobKind::Compress,
            source: folder.into(),
            destination,
            format,
        })
    }

    pub fn extract(archive: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> CoreResult<Self> {
        let source = archive.into();
        let format = ArchiveFormat::from_path(&source)?;
        Ok(Self {
            kind: ArchiveJobKind::Extract,
            source,
            destination: destination.into(),
            format,
        })
    }

    pub fn run(&self, codec: &ArchiveCodec) -> CoreResult<()> {
        match self.kind {
            ArchiveJobKind::Compress => codec.compress(&self.source, &self.destination),
            ArchiveJobKind::Extract => codec.extract(&self.source, &self.destination),
        }
    }
}

/// Compresses folders into archives and extracts them again.
#[derive(Debug, Clone)]
pub struct ArchiveCodec {
    dispatch: Dispatch,
}

impl Default for ArchiveCodec {
    fn default() -> Self {
        Self {
            dispatch: crate::current_dispatch(),
        }
    }
}

impl ArchiveCodec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Writes `folder` into a new archive at `output`.
    ///
    /// The archive is assembled in a temporary file beside `output` and
    /// renamed into place on success, so a failed run leaves no partial file.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedArchiveFormat`] — `output` has an unknown extension.
    /// - [`CoreError::NotFound`] / [`CoreError::NotADirectory`] — bad `folder`.
    /// - [`CoreError::AlreadyExists`] — `output` already exists.
    /// - [`CoreError::Io`] and friends — a file could not be read or written.
    pub fn compress(&self, folder: &Path, output: &Path) -> CoreResult<()> {
        tracing::dispatcher::with_default(&self.dispatch, || compress_zip(folder, output))
    }

    /// Recreates the tree stored in `archive` under `destination`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnsupportedArchiveFormat`] — unknown extension or zip feature.
    /// - [`CoreError::CorruptArchive`] — malformed archive, failed checksum,
    ///   or an entry that would land outside `destination`.
    /// - [`CoreError::AlreadyExists`] — a top-level entry already exists in `destination`.
    pub fn extract(&self, archive: &Path, destination: &Path) -> CoreResult<()> {
        tracing::dispatcher::with_default(&self.dispatch, || extract_zip(archive, destination))
    }
}

/// Compresses with a default codec.
pub fn compress(folder: &Path, output: &Path) -> CoreResult<()> {
    ArchiveCodec::new().compress(folder, output)
}

/// Extracts with a default codec.
pub fn extract(archive: &Path, destination: &Path) -> CoreResult<()> {
    ArchiveCodec::new().extract(archive, destination)
}

fn compress_zip(folder: &Path, output: &Path) -> CoreResult<()> {
    ArchiveFormat::from_path(output)?;
    let folder = fs::canonicalize(folder).map_err(|e| CoreError::from_io(e, folder))?;
    let walker = PathWalker::new(WalkOptions::everything());
    let entries = walker.walk(&folder)?;

    if fs::symlink_metadata(output).is_ok() {
        return Err(CoreError::AlreadyExists(output.to_path_buf()));
    }
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".filekit-archive-")
        .tempfile_in(&parent)
        .map_err(|e| CoreError::from_io(e, &parent))?;
    let temp_path = fs::canonicalize(temp.path()).map_err(|e| CoreError::from_io(e, temp.path()))?;

    tracing::info!(folder = %folder.display(), output = %output.display(), "compressing");

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(BufWriter::new(temp.as_file()));
    let mut files = 0usize;

    for entry in entries {
        if entry.path() == temp_path {
            continue;
        }
        let Some(name) = archive_name(&folder, entry.path()) else {
            continue;
        };
        if entry.is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| zip_write_error(e, output))?;
        } else if entry.is_file() {
            let mut source = File::open(entry.path()).map_err(|e| CoreError::from_io(e, entry.path()))?;
            zip.start_file(name, file_options(options, entry.size()))
                .map_err(|e| zip_write_error(e, output))?;
            io::copy(&mut source, &mut zip).map_err(|e| CoreError::from_io(e, entry.path()))?;
            files += 1;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping symlink or special file");
        }
    }

    let mut writer = zip.finish().map_err(|e| zip_write_error(e, output))?;
    writer.flush().map_err(|e| CoreError::from_io(e, output))?;
    drop(writer);

    temp.persist_noclobber(output)
        .map_err(|e| CoreError::from_io(e.error, output))?;

    tracing::info!(output = %output.display(), files, "archive written");
    Ok(())
}

/// Entries of 4 GiB or more need zip64 headers, which must be requested
/// before the entry is started.
fn file_options(options: SimpleFileOptions, size: u64) -> SimpleFileOptions {
    options.large_file(size >= u64::from(u32::MAX))
}

/// Relative, `/`-separated name of `path` inside `root`.
fn archive_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

struct PlannedEntry {
    index: usize,
    relative: PathBuf,
    is_dir: bool,
}

fn extract_zip(archive_path: &Path, destination: &Path) -> CoreResult<()> {
    ArchiveFormat::from_path(archive_path)?;
    let file = File::open(archive_path).map_err(|e| CoreError::from_io(e, archive_path))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| zip_read_error(e, archive_path))?;

    // Validate every name before touching the destination.
    let mut plan = Vec::with_capacity(archive.len());
    let mut top_level = BTreeSet::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| zip_read_error(e, archive_path))?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            CoreError::CorruptArchive(format!("entry escapes destination: {}", entry.name()))
        })?;
        let Some(Component::Normal(first)) = relative.components().next() else {
            continue;
        };
        top_level.insert(first.to_os_string());
        plan.push(PlannedEntry {
            index,
            is_dir: entry.is_dir(),
            relative,
        });
    }

    fs::create_dir_all(destination).map_err(|e| CoreError::from_io(e, destination))?;
    for name in &top_level {
        let target = destination.join(name);
        if fs::symlink_metadata(&target).is_ok() {
            return Err(CoreError::AlreadyExists(target));
        }
    }

    tracing::info!(archive = %archive_path.display(), destination = %destination.display(), entries = plan.len(), "extracting");

    let staging = tempfile::Builder::new()
        .prefix(".filekit-extract-")
        .tempdir_in(destination)
        .map_err(|e| CoreError::from_io(e, destination))?;

    for planned in &plan {
        let target = staging.path().join(&planned.relative);
        if planned.is_dir {
            fs::create_dir_all(&target).map_err(|e| CoreError::from_io(e, &target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::from_io(e, parent))?;
        }
        let mut reader = archive
            .by_index(planned.index)
            .map_err(|e| zip_read_error(e, archive_path))?;
        let out = File::create(&target).map_err(|e| CoreError::from_io(e, &target))?;
        copy_entry(&mut reader, BufWriter::new(out), &planned.relative, &target)?;
    }

    // Everything verified; publish the top-level entries.
    for name in &top_level {
        let from = staging.path().join(name);
        let to = destination.join(name);
        fs::rename(&from, &to).map_err(|e| CoreError::from_io(e, &to))?;
    }

    tracing::info!(destination = %destination.display(), "archive extracted");
    Ok(())
}

/// Copies one entry, separating archive read failures (corruption) from
/// destination write failures.
fn copy_entry(
    reader: &mut impl Read,
    mut writer: impl Write,
    entry_name: &Path,
    target: &Path,
) -> CoreResult<()> {
    let mut buf = vec![0u8; crate::fs::hash::CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CoreError::CorruptArchive(format!(
                    "{}: {e}",
                    entry_name.display()
                )))
            }
        };
        writer
            .write_all(&buf[..n])
            .map_err(|e| CoreError::from_io(e, target))?;
    }
    writer.flush().map_err(|e| CoreError::from_io(e, target))
}

fn zip_read_error(err: ZipError, archive: &Path) -> CoreError {
    match err {
        ZipError::Io(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
            CoreError::from_io(e, archive)
        }
        err @ ZipError::UnsupportedArchive(_) => CoreError::UnsupportedArchiveFormat(err.to_string()),
        other => CoreError::CorruptArchive(format!("{}: {other}", archive.display())),
    }
}

fn zip_write_error(err: ZipError, output: &Path) -> CoreError {
    match err {
        ZipError::Io(e) => CoreError::from_io(e, output),
        other => CoreError::Io(io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
        PathWalker::new(WalkOptions::everything())
            .walk(root)
            .unwrap()
            .map(|e| {
                let name = archive_name(root, e.path()).unwrap();
                let content = if e.is_dir() {
                    None
                } else {
                    Some(fs::read(e.path()).unwrap())
                };
                (name, content)
            })
            .collect()
    }

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("sub").join("deeper")).unwrap();
        fs::create_dir(root.join("empty")).unwrap();
        fs::write(root.join("top.txt"), "top level").unwrap();
        fs::write(root.join(".hidden"), "dot").unwrap();
        fs::write(root.join("sub").join("data.bin"), (0..=255u8).collect::<Vec<_>>()).unwrap();
        fs::write(root.join("sub").join("deeper").join("note.md"), "# note").unwrap();
    }

    #[test]
    fn round_trip_reproduces_tree() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        sample_tree(&folder);
        let archive = tmp.path().join("out.zip");
        let dest = tmp.path().join("restored");

        compress(&folder, &archive).unwrap();
        extract(&archive, &dest).unwrap();

        assert_eq!(snapshot(&folder), snapshot(&dest));
    }

    #[test]
    fn extract_leaves_no_staging_dir() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        sample_tree(&folder);
        let archive = tmp.path().join("out.zip");
        let dest = tmp.path().join("restored");

        compress(&folder, &archive).unwrap();
        extract(&archive, &dest).unwrap();

        let leftovers: Vec<_> = fs::read_dir(&dest)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".filekit-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn compress_skips_output_inside_folder() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("a.txt"), "a").unwrap();
        let archive = folder.join("self.zip");

        compress(&folder, &archive).unwrap();
        let dest = tmp.path().join("out");
        extract(&archive, &dest).unwrap();

        let names: Vec<_> = snapshot(&dest).into_keys().collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn compress_skips_named_pipe_without_blocking() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("a.txt"), "a").unwrap();
        crate::test_support::make_fifo(&folder.join("pipe"));
        let archive = tmp.path().join("out.zip");

        let (f, a) = (folder.clone(), archive.clone());
        crate::test_support::within_timeout(move || compress(&f, &a)).unwrap();
        let dest = tmp.path().join("out");
        extract(&archive, &dest).unwrap();

        let names: Vec<_> = snapshot(&dest).into_keys().collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
    }

    #[test]
    fn zip64_is_requested_from_four_gib() {
        let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        assert_eq!(file_options(base, u64::from(u32::MAX) - 1), base);
        assert_eq!(file_options(base, u64::from(u32::MAX)), base.large_file(true));
    }

    #[test]
    #[ignore = "deflates a 4 GiB sparse file"]
    fn compress_handles_file_over_four_gib() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        fs::create_dir(&folder).unwrap();
        let big = File::create(folder.join("big.bin")).unwrap();
        big.set_len(u64::from(u32::MAX) + 4096).unwrap();
        drop(big);
        let archive = tmp.path().join("big.zip");

        compress(&folder, &archive).unwrap();

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(zip.by_name("big.bin").unwrap().size(), u64::from(u32::MAX) + 4096);
    }

    #[test]
    fn compress_refuses_existing_output() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        fs::create_dir(&folder).unwrap();
        let archive = tmp.path().join("exists.zip");
        fs::write(&archive, "old").unwrap();

        let err = compress(&folder, &archive).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(&archive).unwrap(), "old");
    }

    #[test]
    fn compress_missing_folder_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = compress(&tmp.path().join("nope"), &tmp.path().join("x.zip")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(!tmp.path().join("x.zip").exists());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = compress(tmp.path(), &tmp.path().join("out.rar")).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedArchiveFormat(_)));

        let err = extract(&tmp.path().join("in.7z"), tmp.path()).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedArchiveFormat(_)));
    }

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("BACKUP.ZIP")).unwrap(),
            ArchiveFormat::Zip
        );
        assert!(ArchiveFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn garbage_archive_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("bad.zip");
        fs::write(&archive, "definitely not a zip file").unwrap();
        let dest = tmp.path().join("dest");

        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, CoreError::CorruptArchive(_)));
    }

    #[test]
    fn checksum_failure_leaves_destination_empty() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("stored.zip");
        {
            let file = File::create(&archive).unwrap();
            let mut zip = ZipWriter::new(file);
            let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("first.txt", stored).unwrap();
            zip.write_all(b"intact").unwrap();
            zip.start_file("second.txt", stored).unwrap();
            zip.write_all(b"hello world payload").unwrap();
            zip.finish().unwrap();
        }
        let mut bytes = fs::read(&archive).unwrap();
        let pos = bytes
            .windows(7)
            .position(|w| w == b"payload")
            .unwrap();
        bytes[pos..pos + 7].copy_from_slice(b"PAYLOAD");
        fs::write(&archive, &bytes).unwrap();

        let dest = tmp.path().join("dest");
        let err = extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, CoreError::CorruptArchive(_)));
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn path_traversal_entry_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("evil.zip");
        {
            let file = File::create(&archive).unwrap();
            let mut zip = ZipWriter::new(file);
            zip.start_file("../escape.txt", SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"gotcha").unwrap();
            zip.finish().unwrap();
        }
        let dest = tmp.path().join("dest");

        let err = extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, CoreError::CorruptArchive(_)));
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn extract_refuses_to_clobber_existing_entries() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("a.txt"), "new").unwrap();
        let archive = tmp.path().join("a.zip");
        compress(&folder, &archive).unwrap();

        let dest = tmp.path().join("dest");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("a.txt"), "old").unwrap();

        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "old");
    }

    #[test]
    fn archive_job_runs_both_directions() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("folder");
        sample_tree(&folder);
        let archive = tmp.path().join("job.zip");
        let dest = tmp.path().join("job-out");
        let codec = ArchiveCodec::new();

        let job = ArchiveJob::compress(&folder, &archive).unwrap();
        assert_eq!(job.format, ArchiveFormat::Zip);
        job.run(&codec).unwrap();
        ArchiveJob::extract(&archive, &dest).unwrap().run(&codec).unwrap();

        assert_eq!(snapshot(&folder), snapshot(&dest));
    }
}
