//! Watcher error types.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that watch operations can produce.
///
/// Native-backend creation failures are deliberately absent: they are not
/// errors but the trigger for the polling fallback.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watch root does not exist or is not a directory.
    #[error("invalid watch root: {0}")]
    InvalidRoot(PathBuf),

    /// Neither the native nor the polling backend could watch the root.
    #[error("failed to initialize watch backend: {0}")]
    Backend(#[from] notify::Error),

    /// Ignore-rule loading failed during startup.
    #[error(transparent)]
    Ignore(#[from] amanmcp_ignore::IgnoreError),

    /// A blocking helper task died.
    #[error("watcher task failed: {0}")]
    TaskJoin(String),
}

/// Convenience alias for watch results.
pub type WatchResult<T> = Result<T, WatchError>;
