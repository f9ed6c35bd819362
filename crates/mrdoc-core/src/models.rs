//! Core data models shared by the filter, formatter, and index pipeline.
//!
//! [`Change`] mirrors one entry of GitLab's "merge request changes" payload.
//! [`RetrievalDocument`] is what the index builder consumes, and [`Chunk`] is
//! what it persists.

use serde::{Deserialize, Serialize};

/// One file-level diff entry within a merge request.
///
/// Deserializes directly from the GitLab `changes[]` objects; extra fields
/// (`a_mode`, `b_mode`, `generated_file`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub old_path: String,
    pub new_path: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    #[serde(default)]
    pub diff: String,
}

/// A retrieval-ready unit of text handed to the index builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalDocument {
    /// Stable identifier derived from the document's source path.
    pub id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Metadata attached to a [`RetrievalDocument`], tagged by origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentMetadata {
    /// Built from a merge-request [`Change`].
    Change(ChangeMetadata),
    /// Built from a file in the documentation corpus.
    File(FileMetadata),
}

impl DocumentMetadata {
    /// The source path this document was built from.
    pub fn path(&self) -> &str {
        match self {
            DocumentMetadata::Change(meta) => &meta.new_path,
            DocumentMetadata::File(meta) => &meta.file_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    pub new_path: String,
    pub old_path: String,
    pub new_file: bool,
    pub renamed_file: bool,
    pub deleted_file: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Path relative to the documentation root, `/`-separated.
    pub file_path: String,
    pub file_name: String,
}

/// A chunk of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_ignores_unknown_gitlab_fields() {
        let json = r#"{
            "old_path": "src/a.py",
            "new_path": "src/a.py",
            "a_mode": "100644",
            "b_mode": "100644",
            "new_file": false,
            "renamed_file": false,
            "deleted_file": false,
            "generated_file": null,
            "diff": "@@ -1 +1 @@\n-x\n+y\n"
        }"#;
        let change: Change = serde_json::from_str(json).unwrap();
        assert_eq!(change.new_path, "src/a.py");
        assert!(!change.new_file);
        assert!(change.diff.contains("+y"));
    }

    #[test]
    fn test_change_missing_flags_default_false() {
        let change: Change =
            serde_json::from_str(r#"{"old_path": "a", "new_path": "b"}"#).unwrap();
        assert!(!change.renamed_file);
        assert!(change.diff.is_empty());
    }

    #[test]
    fn test_metadata_tagged_serialization() {
        let meta = DocumentMetadata::File(FileMetadata {
            file_path: "guide/intro.md".to_string(),
            file_name: "intro.md".to_string(),
        });
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["kind"], "file");
        assert_eq!(meta.path(), "guide/intro.md");
    }
}
