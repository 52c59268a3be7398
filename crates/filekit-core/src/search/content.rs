//! Streaming substring search over file contents.
//!
//! Files are read in [`CHUNK_SIZE`] pieces and never held in memory whole.
//! The last `needle.len() - 1` bytes of decoded text are carried into the
//! next piece so matches that straddle a read boundary are still found.
//! Only valid UTF-8 counts as text: a file that fails to decode anywhere,
//! even after the needle was seen, does not match.

use std::io::{self, ErrorKind, Read};

use memchr::memmem::Finder;
use tokio_util::sync::CancellationToken;

use crate::fs::hash::CHUNK_SIZE;

/// Longest incomplete UTF-8 sequence that can end a chunk.
const MAX_PENDING: usize = 3;

/// Result of scanning one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContentScan {
    Found,
    Absent,
    /// The stream is not valid UTF-8.
    NotText,
    Cancelled,
}

/// A compiled content needle.
#[derive(Debug, Clone)]
pub(crate) struct ContentNeedle {
    finder: Finder<'static>,
    case_insensitive: bool,
}

impl ContentNeedle {
    pub(crate) fn new(needle: &str, case_sensitive: bool) -> Self {
        let needle = if case_sensitive {
            needle.to_string()
        } else {
            needle.to_lowercase()
        };
        Self {
            finder: Finder::new(needle.as_bytes()).into_owned(),
            case_insensitive: !case_sensitive,
        }
    }

    /// Scans `reader` to the end, checking `cancel` before every read.
    pub(crate) fn scan<R: Read>(
        &self,
        mut reader: R,
        cancel: &CancellationToken,
    ) -> io::Result<ContentScan> {
        let overlap = self.finder.needle().len().saturating_sub(1);
        let mut buf = vec![0u8; CHUNK_SIZE + MAX_PENDING];
        let mut pending = 0usize;
        let mut window = String::new();
        let mut found = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(ContentScan::Cancelled);
            }
            let read = match reader.read(&mut buf[pending..pending + CHUNK_SIZE]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let filled = pending + read;
            let Some((text, consumed)) = decode(&buf[..filled]) else {
                return Ok(ContentScan::NotText);
            };

            // Once found, the rest of the file is only validated.
            if !found {
                if self.case_insensitive {
                    window.push_str(&text.to_lowercase());
                } else {
                    window.push_str(text);
                }
                if self.finder.find(window.as_bytes()).is_some() {
                    found = true;
                    window = String::new();
                } else {
                    keep_tail(&mut window, overlap);
                }
            }

            buf.copy_within(consumed..filled, 0);
            pending = filled - consumed;
        }

        // A non-empty remainder means the stream ended mid-sequence.
        Ok(if pending > 0 {
            ContentScan::NotText
        } else if found {
            ContentScan::Found
        } else {
            ContentScan::Absent
        })
    }
}

/// Decodes the longest valid prefix of `bytes`. A trailing incomplete
/// sequence is left undecoded; any other invalid byte yields `None`.
fn decode(bytes: &[u8]) -> Option<(&str, usize)> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Some((text, bytes.len())),
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            std::str::from_utf8(&bytes[..valid])
                .ok()
                .map(|text| (text, valid))
        }
        Err(_) => None,
    }
}

/// Drops all but the last `keep` bytes of `window`, rounded down to a
/// char boundary so more than `keep` bytes may remain.
fn keep_tail(window: &mut String, keep: usize) {
    let mut start = window.len().saturating_sub(keep);
    while !window.is_char_boundary(start) {
        start -= 1;
    }
    window.drain(..start);
}
