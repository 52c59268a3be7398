//! Application configuration loaded from a TOML file.
//!
//! Every field has a default, so a missing section (or an empty file) is a
//! valid configuration. Size limits use `0` to mean "no limit".

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fs::bulk::ConflictPolicy;
use crate::fs::walk::WalkOptions;
use crate::search::query::SearchQuery;

/// Top-level configuration.
///
/// Call [`Config::load`] to read from a TOML path, or
/// [`Config::load_or_default`] when the file is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::from_io(e, path))?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        match Self::load(path) {
            Err(CoreError::NotFound(_)) => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Walk options for browsing and searching.
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            show_hidden: self.general.show_hidden,
            ..WalkOptions::default()
        }
    }

    /// Walk options for duplicate scans: hidden setting plus exclusions.
    pub fn duplicate_walk_options(&self) -> WalkOptions {
        WalkOptions {
            excluded_dirs: self.duplicates.excluded_dirs.clone(),
            ..self.walk_options()
        }
    }

    /// A query pre-filled with the configured search defaults.
    pub fn base_query(&self) -> SearchQuery {
        SearchQuery::new()
            .case_sensitive(self.search.case_sensitive)
            .recursive(self.search.recursive)
            .show_hidden(self.general.show_hidden)
            .max_content_size(non_zero(self.search.max_content_size))
    }
}

fn non_zero(bytes: u64) -> Option<u64> {
    (bytes > 0).then_some(bytes)
}

/// General file-browsing preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub show_hidden: bool,
    /// Checked by the frontend before it issues a delete.
    #[serde(default = "default_true")]
    pub confirm_delete: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            show_hidden: false,
            confirm_delete: true,
        }
    }
}

/// Bulk operation defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationsConfig {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

/// Search defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub max_content_size: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            recursive: true,
            max_content_size: 0,
        }
    }
}

/// Duplicate scan settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicatesConfig {
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
    #[serde(default)]
    pub max_file_size: u64,
}

impl DuplicatesConfig {
    pub fn max_file_size(&self) -> Option<u64> {
        non_zero(self.max_file_size)
    }
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: default_excluded_dirs(),
            max_file_size: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_excluded_dirs() -> Vec<String> {
    [".git", "node_modules", "target"]
        .into_iter()
        .map(String::from)
        .collect()
}
