//! Per-merge-request change-log artifacts.
//!
//! The formatted change log for merge request `N` lives at
//! `{changes_dir}/N.txt`. Each write replaces the previous file outright;
//! there is no append or versioning. The write is not atomic, so callers
//! serialize work per merge request (see [`crate::tasks`]).

use anyhow::{Context, Result};
use mrdoc_core::format::format_change_log;
use mrdoc_core::models::Change;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Path of the change-log artifact for `mr_id`.
pub fn change_log_path(dir: &Path, mr_id: u64) -> PathBuf {
    dir.join(format!("{}.txt", mr_id))
}

/// Format `changes` and write them to `{dir}/{mr_id}.txt`, creating `dir`.
pub fn write_change_log(dir: &Path, mr_id: u64, changes: &[Change]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create changes directory: {}", dir.display()))?;

    let path = change_log_path(dir, mr_id);
    let log = format_change_log(changes);
    std::fs::write(&path, log.as_bytes())
        .with_context(|| format!("Failed to write change log: {}", path.display()))?;

    tracing::info!(mr_id, path = %path.display(), blocks = changes.len(), "wrote change log");
    Ok(path)
}

/// Read the change log for `mr_id`. Returns `Ok(None)` if none was written.
pub fn read_change_log(dir: &Path, mr_id: u64) -> Result<Option<String>> {
    let path = change_log_path(dir, mr_id);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read change log: {}", path.display())),
    }
}
