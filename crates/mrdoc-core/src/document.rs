//! Retrieval-document construction.
//!
//! Changes become documents whose text is the raw diff; documentation files
//! become documents whose text is the file body. Document IDs are a short
//! SHA-256 of the source path so rebuilding an index for the same merge
//! request yields the same IDs.

use sha2::{Digest, Sha256};

use crate::models::{Change, ChangeMetadata, DocumentMetadata, FileMetadata, RetrievalDocument};

/// Build one [`RetrievalDocument`] per change, in input order.
///
/// Callers pass the already-filtered change set. Diff content is not
/// inspected; empty and binary-marker diffs pass through unchanged.
pub fn build_documents(changes: &[Change]) -> Vec<RetrievalDocument> {
    changes.iter().map(change_document).collect()
}

/// Wrap a single change.
///
/// `old_path` in the metadata mirrors `new_path`; see DESIGN.md.
pub fn change_document(change: &Change) -> RetrievalDocument {
    RetrievalDocument {
        id: document_id("change", &change.new_path),
        text: change.diff.clone(),
        metadata: DocumentMetadata::Change(ChangeMetadata {
            new_path: change.new_path.clone(),
            old_path: change.new_path.clone(),
            new_file: change.new_file,
            renamed_file: change.renamed_file,
            deleted_file: change.deleted_file,
        }),
    }
}

/// Wrap a documentation file. `relative_path` uses `/` separators.
pub fn file_document(relative_path: &str, body: String) -> RetrievalDocument {
    let file_name = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
        .to_string();

    RetrievalDocument {
        id: document_id("file", relative_path),
        text: body,
        metadata: DocumentMetadata::File(FileMetadata {
            file_path: relative_path.to_string(),
            file_name,
        }),
    }
}

fn document_id(kind: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}
