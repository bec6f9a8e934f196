//! Ordered rule sets and the query API over them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{IgnoreError, IgnoreResult};
use crate::pattern::Rule;
use crate::{AMAN_DIR, GIT_DIR, IGNORE_FILE};

/// A compiled, ordered collection of ignore rules.
///
/// Rules are appended in file order and evaluated in order: the *last*
/// rule that matches a path decides its ignore state, so a later negation
/// always overrides an earlier match. Matchers are immutable once built;
/// share one behind an [`Arc`] and swap it through a [`MatcherCell`] when
/// the underlying files change.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<Rule>,
}

impl IgnoreMatcher {
    /// A matcher with no rules; nothing is ignored.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse rules from ignore-file content. Unparseable lines are skipped.
    pub fn parse(content: &str) -> Self {
        let rules = content.lines().filter_map(Rule::compile).collect();
        Self { rules }
    }

    /// Parse rules scoped to a directory relative to the project root.
    /// Used for nested ignore files, whose rules only apply in their own
    /// subtree.
    pub fn parse_scoped(content: &str, base: &Path) -> Self {
        let rules = content
            .lines()
            .filter_map(Rule::compile)
            .map(|r| r.scoped(base))
            .collect();
        Self { rules }
    }

    /// Load a single ignore file. A missing file yields an empty matcher;
    /// any other read failure is surfaced.
    pub fn load(path: &Path) -> IgnoreResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(e) => Err(IgnoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Build the composed matcher for a whole tree: in-process patterns
    /// first, then the root ignore file, then nested ignore files scoped
    /// to their own directories (shallowest first).
    ///
    /// This is what the watcher rebuilds when an ignore file changes, and
    /// it agrees with the scanner's per-directory chain on every path.
    pub fn from_root(root: &Path, extra_patterns: &[String]) -> IgnoreResult<Self> {
        let mut matcher = Self::empty();
        matcher.add_patterns(extra_patterns);

        let mut ignore_files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(e.file_type().is_dir() && (name == GIT_DIR || name == AMAN_DIR))
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == IGNORE_FILE)
            .map(|e| e.into_path())
            .collect();
        ignore_files.sort_by_key(|p| p.components().count());

        for file in ignore_files {
            let content = std::fs::read_to_string(&file).map_err(|e| IgnoreError::Io {
                path: file.clone(),
                source: e,
            })?;
            let base = file
                .parent()
                .and_then(|dir| dir.strip_prefix(root).ok())
                .unwrap_or_else(|| Path::new(""));
            if base.as_os_str().is_empty() {
                matcher.extend(Self::parse(&content));
            } else {
                matcher.extend(Self::parse_scoped(&content, base));
            }
            debug!(file = %file.display(), rules = matcher.len(), "loaded ignore file");
        }

        Ok(matcher)
    }

    /// Append in-process patterns (compiled like ignore lines).
    pub fn add_patterns(&mut self, patterns: &[String]) {
        self.rules
            .extend(patterns.iter().filter_map(|p| Rule::compile(p)));
    }

    fn extend(&mut self, other: IgnoreMatcher) {
        self.rules.extend(other.rules);
    }

    /// Decide the ignore state of a root-relative path, or `None` when no
    /// rule matches. Callers composing several matchers (root-down ignore
    /// chains) let a later matcher's decision override an earlier one.
    pub fn decide(&self, rel: &Path, is_dir: bool) -> Option<bool> {
        let mut decision = None;
        for rule in &self.rules {
            if rule.matches(rel, is_dir) {
                decision = Some(!rule.is_negation());
            }
        }
        decision
    }

    /// Whether a root-relative path is ignored.
    pub fn is_ignored(&self, rel: &Path, is_dir: bool) -> bool {
        self.decide(rel, is_dir).unwrap_or(false)
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the matcher holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A shared, swappable matcher slot.
///
/// Readers take a cheap snapshot (`Arc` clone) and match against it
/// lock-free; a reload swaps the whole matcher in one store. Readers see
/// either the old rules or the new rules, never a partial set.
#[derive(Debug)]
pub struct MatcherCell {
    inner: RwLock<Arc<IgnoreMatcher>>,
}

impl MatcherCell {
    pub fn new(matcher: IgnoreMatcher) -> Self {
        Self {
            inner: RwLock::new(Arc::new(matcher)),
        }
    }

    /// Snapshot the current matcher.
    pub fn load(&self) -> Arc<IgnoreMatcher> {
        self.inner.read().clone()
    }

    /// Replace the matcher atomically.
    pub fn store(&self, matcher: IgnoreMatcher) {
        *self.inner.write() = Arc::new(matcher);
    }
}

impl Default for MatcherCell {
    fn default() -> Self {
        Self::new(IgnoreMatcher::empty())
    }
}
