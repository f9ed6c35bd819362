//! Documentation-corpus loader.
//!
//! Walks `[docs].root`, keeps files matching `include_globs`, drops the
//! exact paths listed in `exclude_paths`, and turns every remaining file
//! into a [`RetrievalDocument`].

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use mrdoc_core::document::file_document;
use mrdoc_core::filter::FilterPolicy;
use mrdoc_core::models::RetrievalDocument;
use walkdir::WalkDir;

use crate::config::DocsConfig;

/// Load the documentation corpus as retrieval documents, sorted by path.
pub fn load_documents(docs: &DocsConfig, policy: &FilterPolicy) -> Result<Vec<RetrievalDocument>> {
    let root = &docs.root;
    if !root.exists() {
        bail!("Documentation root does not exist: {}", root.display());
    }

    let include_set = build_globset(&docs.include_globs)?;
    let exclude_set = build_globset(&["**/.git/**".to_string()])?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push((rel_str, path.to_path_buf()));
    }

    let kept = policy.retain_by_path(files, |(rel, _)| rel.as_str());

    let mut documents = Vec::with_capacity(kept.len());
    for (rel, path) in kept {
        let body = match std::fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable documentation file");
                continue;
            }
        };
        documents.push(file_document(&rel, body));
    }

    documents.sort_by(|a, b| a.metadata.path().cmp(b.metadata.path()));
    tracing::info!(root = %root.display(), count = documents.len(), "loaded documentation files");
    Ok(documents)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
