//! Discovered-file metadata.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse content class of a discovered file, derived from its language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    Code,
    Markdown,
    Config,
    Text,
}

/// Metadata for one file yielded by the scanner.
///
/// This is the scanner-level view; chunking, embedding, and persistence
/// belong to the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the project root (submodule paths included).
    pub path: PathBuf,

    /// Absolute path on the filesystem.
    pub abs_path: PathBuf,

    /// Size in bytes.
    pub size: u64,

    /// Last modification time.
    pub modified: DateTime<Utc>,

    /// Content class derived from the language.
    pub class: ContentClass,

    /// Stable language tag (`"go"`, `"python"`, …), if recognized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Whether a conventional generated-code marker was found in the
    /// file head. Advisory: generated files are still yielded.
    pub generated: bool,
}
