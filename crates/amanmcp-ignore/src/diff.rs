//! Rule-set diffing for incremental reconciliation.
//!
//! When an ignore file changes, the indexer does not rescan the world: it
//! diffs the old and new contents and re-examines only the affected
//! patterns. Newly ignored paths leave the index; newly un-ignored paths
//! get scanned back in.

use std::collections::HashSet;

use crate::pattern::normalize_line;

/// Patterns present in one version of an ignore file but not the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternDiff {
    /// Patterns in `new` that are not in `old`.
    pub added: Vec<String>,
    /// Patterns in `old` that are not in `new`.
    pub removed: Vec<String>,
}

impl PatternDiff {
    /// Whether the two files have identical effective rules.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute the effective-pattern set difference between two ignore files.
///
/// Comments, blank lines, and trailing whitespace never contribute;
/// escapes are preserved, so `\#x` and `#x` stay distinct. Line order is
/// irrelevant and the output is sorted for stable downstream handling.
pub fn diff_patterns(old: &str, new: &str) -> PatternDiff {
    let old_set = effective_lines(old);
    let new_set = effective_lines(new);

    let mut added: Vec<String> = new_set.difference(&old_set).cloned().collect();
    let mut removed: Vec<String> = old_set.difference(&new_set).cloned().collect();
    added.sort();
    removed.sort();

    PatternDiff { added, removed }
}

fn effective_lines(content: &str) -> HashSet<String> {
    content.lines().filter_map(normalize_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_content_diffs_empty() {
        let content = "*.log\ntemp/\n!keep.log\n";
        assert!(diff_patterns(content, content).is_empty());
    }

    #[test]
    fn test_comment_and_whitespace_changes_diff_empty() {
        let old = "*.log\ntemp/\n";
        let new = "# build artifacts\n\n*.log   \n\ntemp/\n";
        assert!(diff_patterns(old, new).is_empty());
    }

    #[test]
    fn test_added_and_removed() {
        let old = "*.log\ntemp/\n";
        let new = "*.log\ndist/\n";
        let diff = diff_patterns(old, new);
        assert_eq!(diff.added, vec!["dist/".to_string()]);
        assert_eq!(diff.removed, vec!["temp/".to_string()]);
    }

    #[test]
    fn test_negation_is_a_distinct_pattern() {
        let diff = diff_patterns("*.log\n", "*.log\n!keep.log\n");
        assert_eq!(diff.added, vec!["!keep.log".to_string()]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_escaped_hash_differs_from_comment() {
        let diff = diff_patterns("#literal\n", "\\#literal\n");
        assert_eq!(diff.added, vec!["\\#literal".to_string()]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_reordering_diffs_empty() {
        assert!(diff_patterns("a\nb\nc\n", "c\na\nb\n").is_empty());
    }
}
