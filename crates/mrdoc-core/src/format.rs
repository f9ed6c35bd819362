//! Flat-text rendering of a merge request's changes.
//!
//! The change log is the text the summary prompt and the
//! documentation-update prompt embed. Each retained [`Change`] becomes one
//! block:
//!
//! ```text
//! old_path: src/a.py, new_path: src/a.py, new_file: false, renamed_file: false, deleted_file: false
//! diff: @@ -1 +1 @@
//! -x
//! +y
//! ```
//!
//! Blocks are joined with a blank line, in input order.

use crate::models::Change;

/// Separator placed between two change blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Render the one-line summary of a change's non-diff attributes.
pub fn change_header(change: &Change) -> String {
    format!(
        "old_path: {}, new_path: {}, new_file: {}, renamed_file: {}, deleted_file: {}",
        change.old_path,
        change.new_path,
        change.new_file,
        change.renamed_file,
        change.deleted_file
    )
}

/// Render a single change block: header line followed by the literal diff.
pub fn format_change(change: &Change) -> String {
    format!("{}\ndiff: {}", change_header(change), change.diff)
}

/// Render the full change log for a (filtered) change set.
///
/// An empty change set renders as an empty string.
pub fn format_change_log(changes: &[Change]) -> String {
    changes
        .iter()
        .map(format_change)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterPolicy;

    fn change(path: &str, diff: &str) -> Change {
        Change {
            old_path: path.to_string(),
            new_path: path.to_string(),
            new_file: false,
            renamed_file: false,
            deleted_file: false,
            diff: diff.to_string(),
        }
    }

    #[test]
    fn test_header_lists_all_flags() {
        let c = Change {
            old_path: "old/a.py".to_string(),
            new_path: "new/a.py".to_string(),
            new_file: false,
            renamed_file: true,
            deleted_file: false,
            diff: String::new(),
        };
        assert_eq!(
            change_header(&c),
            "old_path: old/a.py, new_path: new/a.py, new_file: false, renamed_file: true, deleted_file: false"
        );
    }

    #[test]
    fn test_single_block() {
        let log = format_change_log(&[change("a.py", "x")]);
        assert_eq!(
            log,
            "old_path: a.py, new_path: a.py, new_file: false, renamed_file: false, deleted_file: false\ndiff: x"
        );
    }

    #[test]
    fn test_empty_log() {
        assert_eq!(format_change_log(&[]), "");
    }

    #[test]
    fn test_filtered_scenario_has_one_block() {
        let policy = FilterPolicy::new().with_extensions(["lock"]);
        let kept = policy.filter_changes(vec![change("a.py", "x"), change("b.lock", "y")]);
        let log = format_change_log(&kept);
        assert_eq!(log.matches("new_path:").count(), 1);
        assert!(log.contains("new_path: a.py"));
        assert!(!log.contains("b.lock"));
    }

    #[test]
    fn test_order_preserved() {
        let changes = vec![change("z.py", "1"), change("a.py", "2"), change("m.py", "3")];
        let log = format_change_log(&changes);
        let z = log.find("new_path: z.py").unwrap();
        let a = log.find("new_path: a.py").unwrap();
        let m = log.find("new_path: m.py").unwrap();
        assert!(z < a && a < m);
    }

    #[test]
    fn test_blocks_separated_by_blank_line() {
        let log = format_change_log(&[change("a.py", "x"), change("b.py", "y")]);
        let blocks: Vec<&str> = log.split(BLOCK_SEPARATOR).collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[1].starts_with("old_path: b.py"));
    }
}
