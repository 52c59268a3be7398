//! Streamed content fingerprints.
//!
//! A [`Fingerprint`] identifies file *content* for equality testing only.
//! It is computed by folding fixed-size chunks into a SHA-256 state, so
//! memory use stays bounded no matter how large the file is.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// Read buffer size used while hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Content digest of a single file.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Computes fingerprints with an optional size cap.
#[derive(Debug, Clone, Default)]
pub struct HashingEngine {
    max_file_size: Option<u64>,
}

impl HashingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses files larger than `bytes`. Such files are treated as
    /// unhashable and therefore excluded from duplicate detection.
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: Option<u64>) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Fingerprints the file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] / [`CoreError::PermissionDenied`] when the file cannot be opened.
    /// - [`CoreError::InvalidRequest`] when the file exceeds the configured size cap
    ///   or is not a regular file (directory, FIFO, socket, device).
    /// - [`CoreError::Io`] for read failures.
    pub fn fingerprint(&self, path: &Path) -> CoreResult<Fingerprint> {
        // Checked before opening: opening a FIFO for reading blocks.
        let metadata = std::fs::metadata(path).map_err(|e| CoreError::from_io(e, path))?;
        if !metadata.is_file() {
            return Err(CoreError::InvalidRequest(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if let Some(limit) = self.max_file_size {
            let len = metadata.len();
            if len > limit {
                return Err(CoreError::InvalidRequest(format!(
                    "{} is {len} bytes, above the {limit} byte hashing limit",
                    path.display()
                )));
            }
        }

        let mut file = File::open(path).map_err(|e| CoreError::from_io(e, path))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CoreError::from_io(e, path)),
            };
            hasher.update(&buf[..n]);
        }

        Ok(Fingerprint(hasher.finalize().into()))
    }
}

/// Fingerprints `path` with the default (uncapped) engine.
pub fn fingerprint(path: &Path) -> CoreResult<Fingerprint> {
    HashingEngine::new().fingerprint(path)
}
