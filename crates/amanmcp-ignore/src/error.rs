//! Ignore-rule error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading ignore files.
///
/// Compilation failures of a single pattern are not errors: the offending
/// rule is skipped and the rest of the matcher stays usable.
#[derive(Debug, Error)]
pub enum IgnoreError {
    /// An ignore file exists but could not be read.
    #[error("failed to read ignore file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for ignore results.
pub type IgnoreResult<T> = Result<T, IgnoreError>;
