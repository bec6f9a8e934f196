//! Scanner error types.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that scan operations can produce.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan root does not exist or is not a directory.
    #[error("invalid scan root: {0}")]
    InvalidRoot(PathBuf),

    /// The requested subtree lies outside the project root.
    #[error("subtree is outside the project root: {0}")]
    SubtreeOutsideRoot(PathBuf),

    /// Cancellation was requested; sent as the terminal stream item.
    #[error("scan canceled")]
    Canceled,

    /// The submodule manifest could not be parsed or resolved.
    #[error("submodule manifest error at {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// A submodule HEAD held a symbolic ref instead of a commit identity.
    #[error("submodule HEAD is a symbolic ref: {0}")]
    SymbolicHead(String),

    /// Ignore-file loading failed.
    #[error(transparent)]
    Ignore(#[from] amanmcp_ignore::IgnoreError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for scan results.
pub type ScanResult<T> = Result<T, ScanError>;
