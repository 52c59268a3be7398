//! Search queries and their compiled form.

use std::fs::File;

use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::FileEntry;
use crate::search::content::{ContentNeedle, ContentScan};

/// How close a size must be to count as equal, in bytes.
pub const EQUAL_TOLERANCE: u64 = 1024;

/// File-name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamePattern {
    /// Shell glob matched against the whole name (`*.txt`, `report_[0-9]*`).
    Glob(String),
    /// Regular expression searched anywhere in the name.
    Regex(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeOperator {
    #[default]
    Any,
    GreaterThan,
    LessThan,
    EqualTo,
}

/// Binary size units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    #[default]
    B,
    KB,
    MB,
    GB,
}

impl SizeUnit {
    pub fn multiplier(self) -> u64 {
        match self {
            Self::B => 1,
            Self::KB => 1024,
            Self::MB => 1024 * 1024,
            Self::GB => 1024 * 1024 * 1024,
        }
    }
}

/// Size predicate applied to regular files only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeFilter {
    op: SizeOperator,
    threshold: u64,
}

impl SizeFilter {
    /// `value` may be fractional (`1.5` MB). Negative values clamp to zero.
    pub fn new(op: SizeOperator, value: f64, unit: SizeUnit) -> Self {
        let threshold = (value.max(0.0) * unit.multiplier() as f64).round() as u64;
        Self { op, threshold }
    }

    pub fn bytes(op: SizeOperator, threshold: u64) -> Self {
        Self { op, threshold }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn op(&self) -> SizeOperator {
        self.op
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn is_any(&self) -> bool {
        self.op == SizeOperator::Any
    }

    pub fn matches(&self, size: u64) -> bool {
        match self.op {
            SizeOperator::Any => true,
            SizeOperator::GreaterThan => size > self.threshold,
            SizeOperator::LessThan => size < self.threshold,
            SizeOperator::EqualTo => size.abs_diff(self.threshold) <= EQUAL_TOLERANCE,
        }
    }
}

/// Everything a search filters on. Build with the chained setters and hand
/// to [`crate::search::SearchEngine::search`].
///
/// # Examples
///
/// ```
/// use filekit_core::search::{SearchQuery, SizeFilter, SizeOperator, SizeUnit};
///
/// let query = SearchQuery::new()
///     .name_glob("report*")
///     .content("Q3")
///     .size(SizeFilter::new(SizeOperator::GreaterThan, 1.0, SizeUnit::KB));
/// assert!(query.compile().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    name: Option<NamePattern>,
    case_sensitive: bool,
    content: Option<String>,
    size: SizeFilter,
    recursive: bool,
    show_hidden: bool,
    max_content_size: Option<u64>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            name: None,
            case_sensitive: false,
            content: None,
            size: SizeFilter::any(),
            recursive: true,
            show_hidden: false,
            max_content_size: None,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn name_glob(mut self, pattern: impl Into<String>) -> Self {
        self.name = Some(NamePattern::Glob(pattern.into()));
        self
    }

    #[must_use]
    pub fn name_regex(mut self, pattern: impl Into<String>) -> Self {
        self.name = Some(NamePattern::Regex(pattern.into()));
        self
    }

    /// Applies to both the name pattern and the content substring.
    #[must_use]
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    /// Substring that regular files must contain. Empty strings are ignored.
    #[must_use]
    pub fn content(mut self, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        self.content = (!needle.is_empty()).then_some(needle);
        self
    }

    #[must_use]
    pub fn size(mut self, filter: SizeFilter) -> Self {
        self.size = filter;
        self
    }

    #[must_use]
    pub fn recursive(mut self, yes: bool) -> Self {
        self.recursive = yes;
        self
    }

    #[must_use]
    pub fn show_hidden(mut self, yes: bool) -> Self {
        self.show_hidden = yes;
        self
    }

    /// Files larger than this are not scanned for content and therefore
    /// do not match a content query.
    #[must_use]
    pub fn max_content_size(mut self, bytes: Option<u64>) -> Self {
        self.max_content_size = bytes;
        self
    }

    pub fn name_pattern(&self) -> Option<&NamePattern> {
        self.name.as_ref()
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn shows_hidden(&self) -> bool {
        self.show_hidden
    }

    /// Compiles the patterns once so evaluation never fails.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidPattern`] for a malformed glob or regex.
    pub fn compile(&self) -> CoreResult<CompiledQuery> {
        let name = match &self.name {
            None => None,
            Some(NamePattern::Glob(p)) => {
                let pattern = Pattern::new(p)
                    .map_err(|e| CoreError::InvalidPattern(format!("{p}: {e}")))?;
                let options = MatchOptions {
                    case_sensitive: self.case_sensitive,
                    require_literal_separator: false,
                    require_literal_leading_dot: false,
                };
                Some(NameMatcher::Glob(pattern, options))
            }
            Some(NamePattern::Regex(p)) => {
                let regex = RegexBuilder::new(p)
                    .case_insensitive(!self.case_sensitive)
                    .build()
                    .map_err(|e| CoreError::InvalidPattern(e.to_string()))?;
                Some(NameMatcher::Regex(regex))
            }
        };

        let content = self
            .content
            .as_deref()
            .map(|needle| ContentNeedle::new(needle, self.case_sensitive));

        Ok(CompiledQuery {
            name,
            content,
            size: self.size,
            max_content_size: self.max_content_size,
        })
    }
}

/// Which predicates a result satisfied. A flag is `true` only when the
/// query carried that predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchedPredicates {
    pub name: bool,
    pub size: bool,
    pub content: bool,
}

#[derive(Debug)]
enum NameMatcher {
    Glob(Pattern, MatchOptions),
    Regex(Regex),
}

impl NameMatcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Glob(pattern, options) => pattern.matches_with(name, *options),
            Self::Regex(regex) => regex.is_match(name),
        }
    }
}

/// A [`SearchQuery`] with its patterns compiled.
#[derive(Debug)]
pub struct CompiledQuery {
    name: Option<NameMatcher>,
    content: Option<ContentNeedle>,
    size: SizeFilter,
    max_content_size: Option<u64>,
}

impl CompiledQuery {
    /// Evaluates name, then size, then content, stopping at the first
    /// predicate that fails.
    pub fn evaluate(&self, entry: &FileEntry) -> Option<MatchedPredicates> {
        self.evaluate_until(entry, &CancellationToken::new())
    }

    /// Like [`Self::evaluate`], but a content scan stops once `cancel`
    /// fires and the entry then does not match.
    pub fn evaluate_until(
        &self,
        entry: &FileEntry,
        cancel: &CancellationToken,
    ) -> Option<MatchedPredicates> {
        let mut matched = MatchedPredicates::default();

        if let Some(name) = &self.name {
            if !name.matches(entry.name()) {
                return None;
            }
            matched.name = true;
        }

        if entry.is_dir() {
            // Size and content do not apply to directories.
            return matched.name.then_some(matched);
        }

        // Symlinks and special files have no meaningful size or content.
        if !self.size.is_any() {
            if !entry.is_file() || !self.size.matches(entry.size()) {
                return None;
            }
            matched.size = true;
        }

        if let Some(needle) = &self.content {
            if !entry.is_file() || !self.content_matches(entry, needle, cancel) {
                return None;
            }
            matched.content = true;
        }

        Some(matched)
    }

    fn content_matches(
        &self,
        entry: &FileEntry,
        needle: &ContentNeedle,
        cancel: &CancellationToken,
    ) -> bool {
        if let Some(limit) = self.max_content_size {
            if entry.size() > limit {
                tracing::debug!(path = %entry.path().display(), size = entry.size(), "too large to scan");
                return false;
            }
        }
        let scanned = File::open(entry.path()).and_then(|file| needle.scan(file, cancel));
        match scanned {
            Ok(ContentScan::Found) => true,
            Ok(ContentScan::Absent) => false,
            Ok(ContentScan::NotText) => {
                tracing::debug!(path = %entry.path().display(), "not valid UTF-8, treating as non-matching");
                false
            }
            Ok(ContentScan::Cancelled) => {
                tracing::debug!(path = %entry.path().display(), "content scan cancelled");
                false
            }
            Err(err) => {
                tracing::debug!(path = %entry.path().display(), error = %err, "unreadable, treating as non-matching");
                false
            }
        }
    }
}
