//! # amanmcp-ignore — ignore rules for the ingestion pipeline
//!
//! Foundation layer for the amanmcp indexer. Compiles `.ignore` files
//! (gitignore syntax) into ordered rule sets, answers "is this path
//! ignored?" queries, diffs two rule files to drive incremental
//! reconciliation, and keeps a bounded per-directory matcher cache.
//!
//! ## Architecture
//!
//! - `Rule`: one compiled ignore line (negation, anchoring, directory-only)
//! - `IgnoreMatcher`: ordered rules, evaluated last-match-wins
//! - `MatcherCell`: atomically swappable shared matcher (watcher reloads)
//! - `PatternDiff`: set difference between two ignore files
//! - `IgnoreCache`: LRU of compiled per-directory matchers
//!
//! Matchers are immutable once built. Shared mutation happens by swapping
//! a whole matcher inside a `MatcherCell`, so concurrent readers see
//! either the old rules or the new rules, never a half-built set.

pub mod cache;
pub mod diff;
pub mod error;
pub mod matcher;
pub mod pattern;

pub use cache::IgnoreCache;
pub use diff::{diff_patterns, PatternDiff};
pub use error::{IgnoreError, IgnoreResult};
pub use matcher::{IgnoreMatcher, MatcherCell};
pub use pattern::Rule;

/// The service-private directory at a project root. Never scanned, never
/// watched, never reported.
pub const AMAN_DIR: &str = ".amanmcp";

/// Version-control metadata directory, suppressed everywhere.
pub const GIT_DIR: &str = ".git";

/// Name of the ignore files honored by the scanner and watcher.
pub const IGNORE_FILE: &str = ".ignore";

/// Root-level configuration files the watcher reports as config changes.
pub const CONFIG_FILES: &[&str] = &[".amanmcp.yaml", ".amanmcp.yml"];
