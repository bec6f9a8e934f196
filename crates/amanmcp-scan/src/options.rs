//! Scan configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Files larger than this are skipped when `max_file_size` is left at 0.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Options for one scan operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Project root to walk. Must exist and be a directory.
    pub root: PathBuf,

    /// Include patterns. When non-empty, a file must match at least one
    /// to be yielded. Applied after every exclusion layer: an excluded
    /// path stays excluded.
    pub include: Vec<String>,

    /// User exclude patterns, applied to files and pruned directories.
    pub exclude: Vec<String>,

    /// Honor `.ignore` files found in the tree (root and nested).
    pub respect_ignore_files: bool,

    /// Worker count for downstream classification. 0 means the processor
    /// count. Also sizes the result channel (`workers × 10`).
    pub workers: usize,

    /// Maximum file size in bytes. 0 means the 10 MiB default.
    pub max_file_size: u64,

    /// Follow symbolic links instead of skipping them.
    pub follow_symlinks: bool,

    /// Submodule traversal; `None` disables it.
    pub submodules: Option<SubmoduleOptions>,
}

impl ScanOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
            respect_ignore_files: true,
            workers: 0,
            max_file_size: 0,
            follow_symlinks: false,
            submodules: None,
        }
    }

    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn effective_max_file_size(&self) -> u64 {
        if self.max_file_size == 0 {
            DEFAULT_MAX_FILE_SIZE
        } else {
            self.max_file_size
        }
    }
}

/// Submodule discovery options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmoduleOptions {
    /// Recurse into submodules of submodules.
    pub recursive: bool,

    /// Include patterns over submodule names and paths. When non-empty,
    /// at least one must match.
    pub include: Vec<String>,

    /// Exclude patterns over submodule names and paths. Any match rejects
    /// the submodule.
    pub exclude: Vec<String>,
}
