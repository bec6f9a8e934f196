//! # amanmcp-scan — streaming project discovery
//!
//! Walks a project tree, applies the layered exclusion pipeline
//! (sensitive patterns, built-in exclusions, user patterns, hierarchical
//! ignore files, include filters, size and binary checks), classifies
//! survivors by language and content class, and streams [`FileInfo`]
//! items through a bounded channel.
//!
//! Submodules are discovered from the `.gitmodules` manifest and walked
//! after the main tree, with results reported against the project root so
//! downstream indexing sees one consistent path space.
//!
//! The scanner is a best-effort producer: entries that fail to stat or
//! read are skipped, only root-level failures abort, and cancellation is
//! observed on every directory entry.

pub mod classify;
pub mod error;
pub mod exclude;
pub mod info;
pub mod options;
pub mod scanner;
pub mod submodule;

pub use classify::{content_class, language};
pub use error::{ScanError, ScanResult};
pub use info::{ContentClass, FileInfo};
pub use options::{ScanOptions, SubmoduleOptions, DEFAULT_MAX_FILE_SIZE};
pub use scanner::{ScanStream, Scanner};
pub use submodule::{SubmoduleInfo, SubmoduleResolver};
