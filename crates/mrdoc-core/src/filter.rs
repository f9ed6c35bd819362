//! Path exclusion policy for merge-request changes and documentation files.
//!
//! A single [`FilterPolicy`] covers every place the pipeline drops files:
//! lock files and generated artifacts in a change set, test folders, and
//! specific documentation pages that should never reach the index.
//!
//! # Rules
//!
//! A path is excluded when any of the following hold:
//!
//! 1. The file extension (text after the last `.` of the final path segment)
//!    is in `excluded_extensions`. A name without a dot has no extension, so
//!    `Makefile` is never excluded by an extension rule; use an exact path.
//! 2. Any `/`-separated segment equals an entry in `excluded_folders`.
//! 3. The whole path equals an entry in `excluded_exact_paths`.
//!
//! Matching is case-sensitive. Filtering preserves input order and is
//! idempotent.
//!
//! # Example
//!
//! ```rust
//! use mrdoc_core::filter::FilterPolicy;
//!
//! let policy = FilterPolicy::new()
//!     .with_extensions(["lock"])
//!     .with_folders(["tests"]);
//!
//! assert!(policy.is_excluded("poetry.lock"));
//! assert!(policy.is_excluded("tests/test_x.py"));
//! assert!(!policy.is_excluded("src/app.py"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::Change;

/// Exclusion rules applied to change sets and documentation sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPolicy {
    #[serde(default)]
    pub excluded_extensions: BTreeSet<String>,
    #[serde(default)]
    pub excluded_folders: BTreeSet<String>,
    #[serde(default)]
    pub excluded_exact_paths: BTreeSet<String>,
}

impl FilterPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add excluded extensions. A leading `.` is stripped, so `".lock"` and
    /// `"lock"` are equivalent.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_extensions.extend(
            extensions
                .into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty()),
        );
        self
    }

    pub fn with_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_folders.extend(
            folders
                .into_iter()
                .map(|f| f.as_ref().trim().trim_matches('/').to_string())
                .filter(|f| !f.is_empty()),
        );
        self
    }

    /// Add excluded paths, relative to the corpus root. A leading `/` is
    /// stripped, so `"/index.md"` and `"index.md"` are equivalent.
    pub fn with_exact_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_exact_paths.extend(
            paths
                .into_iter()
                .map(|p| p.as_ref().trim().trim_start_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        );
        self
    }

    /// Returns `true` if `path` matches any exclusion rule.
    pub fn is_excluded(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        if let Some((_, ext)) = file_name.rsplit_once('.') {
            if self.excluded_extensions.contains(ext) {
                return true;
            }
        }

        if path.split('/').any(|seg| self.excluded_folders.contains(seg)) {
            return true;
        }

        self.excluded_exact_paths.contains(path)
    }

    /// Keep the changes whose `new_path` is not excluded, in input order.
    pub fn filter_changes(&self, changes: Vec<Change>) -> Vec<Change> {
        self.retain_by_path(changes, |c| &c.new_path)
    }

    /// Keep the items whose path (as returned by `path_of`) is not excluded.
    pub fn retain_by_path<T, F>(&self, mut items: Vec<T>, path_of: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        items.retain(|item| !self.is_excluded(path_of(item)));
        items
    }

    /// `true` when the policy has no rules at all.
    pub fn is_empty(&self) -> bool {
        self.excluded_extensions.is_empty()
            && self.excluded_folders.is_empty()
            && self.excluded_exact_paths.is_empty()
    }
}

/// Split a comma-separated configuration value into trimmed, non-empty items.
///
/// `"lock, toml,,"` yields `["lock", "toml"]`.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
