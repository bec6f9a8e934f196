//! Bounded cache of compiled per-directory matchers.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{IgnoreError, IgnoreResult};
use crate::matcher::IgnoreMatcher;
use crate::IGNORE_FILE;

/// Default number of per-directory matchers kept compiled.
pub const DEFAULT_CAPACITY: usize = 1000;

/// LRU cache from absolute directory path to that directory's compiled
/// `.ignore` matcher.
///
/// Entries may be evicted at any time; callers just recompile on the next
/// visit. Directories without an ignore file are not cached; they are
/// the common case and rechecking them is a single `exists` call.
pub struct IgnoreCache {
    inner: RwLock<LruCache<PathBuf, Arc<IgnoreMatcher>>>,
}

impl IgnoreCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// The matcher for `dir`'s own ignore file, loading and caching it on
    /// miss. Returns `None` when the directory has no ignore file; I/O
    /// failures on an existing file are surfaced.
    pub fn get(&self, dir: &Path) -> IgnoreResult<Option<Arc<IgnoreMatcher>>> {
        let hit = self.inner.read().peek(dir).cloned();
        if let Some(hit) = hit {
            self.inner.write().promote(dir);
            return Ok(Some(hit));
        }

        let file = dir.join(IGNORE_FILE);
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IgnoreError::Io {
                    path: file,
                    source: e,
                })
            }
        };

        let matcher = Arc::new(IgnoreMatcher::parse(&content));
        self.inner.write().push(dir.to_path_buf(), matcher.clone());
        debug!(dir = %dir.display(), rules = matcher.len(), "cached directory matcher");
        Ok(Some(matcher))
    }

    /// Drop every cached matcher. Called when any ignore file mutates.
    pub fn invalidate(&self) {
        self.inner.write().clear();
    }

    /// Number of cached matchers.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for IgnoreCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
