//! File-level change events.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Modify,
    Delete,
    Rename,
    /// An ignore file changed; the consumer should diff the rules and
    /// reconcile affected subtrees.
    IgnoreRulesChanged,
    /// A service configuration file changed.
    ConfigChanged,
}

impl Operation {
    /// Synthetic operations bypass per-path coalescing.
    pub fn is_synthetic(self) -> bool {
        matches!(self, Operation::IgnoreRulesChanged | Operation::ConfigChanged)
    }
}

/// One change event, with paths relative to the watched root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    /// Affected path (the new path for renames).
    pub path: PathBuf,

    /// Previous path; only present for renames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<PathBuf>,

    pub op: Operation,

    pub is_dir: bool,

    /// When the watcher observed the change.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(op: Operation, path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            op,
            is_dir,
            timestamp: Utc::now(),
        }
    }

    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            path: to.into(),
            old_path: Some(from.into()),
            op: Operation::Rename,
            is_dir,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_classification() {
        assert!(Operation::IgnoreRulesChanged.is_synthetic());
        assert!(Operation::ConfigChanged.is_synthetic());
        assert!(!Operation::Create.is_synthetic());
        assert!(!Operation::Rename.is_synthetic());
    }

    #[test]
    fn test_rename_carries_both_endpoints() {
        let ev = FileEvent::rename("old.rs", "new.rs", false);
        assert_eq!(ev.op, Operation::Rename);
        assert_eq!(ev.path, PathBuf::from("new.rs"));
        assert_eq!(ev.old_path, Some(PathBuf::from("old.rs")));
    }
}
