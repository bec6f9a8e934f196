//! Streaming, cancelable project traversal.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use amanmcp_ignore::{IgnoreCache, IgnoreMatcher, AMAN_DIR, GIT_DIR};

use crate::classify;
use crate::error::{ScanError, ScanResult};
use crate::exclude::{self, EXCLUDED_FILES, SENSITIVE_PATTERNS};
use crate::info::FileInfo;
use crate::options::ScanOptions;
use crate::submodule::{SubmoduleInfo, SubmoduleResolver};

/// Bytes read from each file head for the binary and generated checks.
const HEAD_BYTES: usize = 1024;

/// Backoff while the result channel is full and cancellation is pending.
const SEND_RETRY: Duration = Duration::from_millis(5);

/// The finite stream of scan results.
///
/// Items arrive as they are discovered; the stream closes on completion
/// or cancellation. Cancellation is surfaced as a terminal `Err` item.
pub struct ScanStream {
    rx: mpsc::Receiver<ScanResult<FileInfo>>,
}

impl ScanStream {
    /// Next discovered file, or `None` once the stream has closed.
    pub async fn recv(&mut self) -> Option<ScanResult<FileInfo>> {
        self.rx.recv().await
    }

    /// Drain the stream into a vector, failing on the first error item.
    pub async fn collect(mut self) -> ScanResult<Vec<FileInfo>> {
        let mut files = Vec::new();
        while let Some(item) = self.rx.recv().await {
            files.push(item?);
        }
        Ok(files)
    }
}

/// Walks project trees and streams surviving files.
///
/// The scanner owns a bounded LRU of compiled per-directory matchers;
/// entries may be evicted at any time and are transparently recompiled.
pub struct Scanner {
    cache: Arc<IgnoreCache>,
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(IgnoreCache::default()),
        }
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: Arc::new(IgnoreCache::new(capacity)),
        }
    }

    /// Drop all cached per-directory matchers. Called after an
    /// ignore-file mutation so the next walk recompiles.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// Start a full scan. Validation failures surface here; everything
    /// after that arrives on the stream.
    pub fn scan(&self, options: ScanOptions, token: CancellationToken) -> ScanResult<ScanStream> {
        let root = validate_root(&options.root)?;
        let (walker, rx) = Walker::new(root, options, self.cache.clone(), token);
        tokio::task::spawn_blocking(move || walker.run_full());
        Ok(ScanStream { rx })
    }

    /// Scan one subtree, still reporting paths relative to the project
    /// root. Used to reconcile incrementally after an ignore-file change.
    pub fn scan_subtree(
        &self,
        options: ScanOptions,
        subtree: &Path,
        token: CancellationToken,
    ) -> ScanResult<ScanStream> {
        let root = validate_root(&options.root)?;
        let start = root.join(subtree);
        if !start.is_dir() {
            return Err(ScanError::InvalidRoot(start));
        }
        let canonical = start.canonicalize()?;
        if !canonical.starts_with(&root) {
            return Err(ScanError::SubtreeOutsideRoot(subtree.to_path_buf()));
        }

        let subtree = subtree.to_path_buf();
        let (walker, rx) = Walker::new(root, options, self.cache.clone(), token);
        tokio::task::spawn_blocking(move || walker.run_subtree(&subtree));
        Ok(ScanStream { rx })
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_root(root: &Path) -> ScanResult<PathBuf> {
    let canonical = root
        .canonicalize()
        .map_err(|_| ScanError::InvalidRoot(root.to_path_buf()))?;
    if !canonical.is_dir() {
        return Err(ScanError::InvalidRoot(root.to_path_buf()));
    }
    Ok(canonical)
}

/// Walk abort reasons. `ConsumerGone` ends the walk without a terminal
/// item; the consumer already hung up.
enum Halt {
    Canceled,
    ConsumerGone,
}

/// Root-down stack of per-directory matchers for the current walk.
///
/// Deeper matchers are pushed later and their decisions override
/// shallower ones, matching nested-ignore precedence.
struct MatcherChain {
    entries: Vec<(PathBuf, Arc<IgnoreMatcher>)>,
}

impl MatcherChain {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn push(&mut self, dir: &Path, matcher: Arc<IgnoreMatcher>) {
        self.entries.push((dir.to_path_buf(), matcher));
    }

    fn pop(&mut self) {
        self.entries.pop();
    }

    fn decide(&self, rel: &Path, is_dir: bool) -> Option<bool> {
        let mut decision = None;
        for (dir, matcher) in &self.entries {
            let local = if dir.as_os_str().is_empty() {
                rel
            } else {
                match rel.strip_prefix(dir) {
                    Ok(local) if !local.as_os_str().is_empty() => local,
                    _ => continue,
                }
            };
            if let Some(d) = matcher.decide(local, is_dir) {
                decision = Some(d);
            }
        }
        decision
    }
}

struct Walker {
    root: PathBuf,
    opts: ScanOptions,
    cache: Arc<IgnoreCache>,
    token: CancellationToken,
    tx: mpsc::Sender<ScanResult<FileInfo>>,
    max_size: u64,
}

impl Walker {
    fn new(
        root: PathBuf,
        opts: ScanOptions,
        cache: Arc<IgnoreCache>,
        token: CancellationToken,
    ) -> (Self, mpsc::Receiver<ScanResult<FileInfo>>) {
        let buffer = opts.effective_workers().max(1) * 10;
        let (tx, rx) = mpsc::channel(buffer);
        let max_size = opts.effective_max_file_size();
        (
            Self {
                root,
                opts,
                cache,
                token,
                tx,
                max_size,
            },
            rx,
        )
    }

    fn run_full(self) {
        if let Err(e) = std::fs::read_dir(&self.root) {
            let _ = self.tx.try_send(Err(ScanError::Io(e)));
            return;
        }

        // Resolve submodules up front so their trees are pruned from the
        // main walk and traversed separately afterwards.
        let submodules = match &self.opts.submodules {
            Some(sub_opts) => match SubmoduleResolver::discover(&self.root, sub_opts) {
                Ok(found) => found,
                Err(e) => {
                    warn!(error = %e, "submodule discovery failed, scanning main tree only");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let skip: HashSet<PathBuf> = submodules.iter().map(|s| s.path.clone()).collect();

        let root = self.root.clone();
        let mut chain = MatcherChain::new();
        if let Err(halt) = self.walk_dir(&root, Path::new(""), Path::new(""), &skip, &mut chain) {
            self.finish(halt);
            return;
        }

        for sub in submodules.iter().filter(|s| s.initialized) {
            if let Err(halt) = self.walk_submodule(sub, &submodules) {
                self.finish(halt);
                return;
            }
        }
    }

    fn run_subtree(self, subtree: &Path) {
        let start = self.root.join(subtree);

        // Seed the chain with every ignore file from the root down to the
        // subtree's parent so nested rules apply exactly as in a full scan.
        let mut chain = MatcherChain::new();
        if self.opts.respect_ignore_files {
            let mut ancestors = vec![PathBuf::new()];
            let mut acc = PathBuf::new();
            for component in subtree.components() {
                acc.push(component);
                if acc == *subtree {
                    break;
                }
                ancestors.push(acc.clone());
            }
            for dir_rel in ancestors {
                let abs = if dir_rel.as_os_str().is_empty() {
                    self.root.clone()
                } else {
                    self.root.join(&dir_rel)
                };
                match self.cache.get(&abs) {
                    Ok(Some(m)) => chain.push(&dir_rel, m),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "unreadable ignore file, skipping"),
                }
            }
        }

        let skip = HashSet::new();
        if let Err(halt) = self.walk_dir(&start, subtree, Path::new(""), &skip, &mut chain) {
            self.finish(halt);
        }
    }

    fn walk_submodule(&self, sub: &SubmoduleInfo, all: &[SubmoduleInfo]) -> Result<(), Halt> {
        let sub_root = self.root.join(&sub.path);
        // Nested submodules walk on their own; prune them here.
        let skip: HashSet<PathBuf> = all
            .iter()
            .filter(|other| other.path != sub.path)
            .filter_map(|other| other.path.strip_prefix(&sub.path).ok())
            .map(|p| p.to_path_buf())
            .collect();

        debug!(path = %sub.path.display(), "walking submodule");
        let mut chain = MatcherChain::new();
        self.walk_dir(&sub_root, Path::new(""), &sub.path, &skip, &mut chain)
    }

    fn finish(&self, halt: Halt) {
        if let Halt::Canceled = halt {
            let _ = self.tx.try_send(Err(ScanError::Canceled));
        }
    }

    /// Depth-first walk of one directory. `rel_dir` is relative to the
    /// walk base, `prefix` is prepended to emitted paths (submodules).
    fn walk_dir(
        &self,
        abs_dir: &Path,
        rel_dir: &Path,
        prefix: &Path,
        skip: &HashSet<PathBuf>,
        chain: &mut MatcherChain,
    ) -> Result<(), Halt> {
        let pushed = self.push_dir_matcher(abs_dir, rel_dir, chain);
        let result = self.walk_entries(abs_dir, rel_dir, prefix, skip, chain);
        if pushed {
            chain.pop();
        }
        result
    }

    fn push_dir_matcher(&self, abs_dir: &Path, rel_dir: &Path, chain: &mut MatcherChain) -> bool {
        if !self.opts.respect_ignore_files {
            return false;
        }
        match self.cache.get(abs_dir) {
            Ok(Some(matcher)) => {
                chain.push(rel_dir, matcher);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "unreadable ignore file, skipping");
                false
            }
        }
    }

    fn walk_entries(
        &self,
        abs_dir: &Path,
        rel_dir: &Path,
        prefix: &Path,
        skip: &HashSet<PathBuf>,
        chain: &mut MatcherChain,
    ) -> Result<(), Halt> {
        let entries = match std::fs::read_dir(abs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                // Unreadable subdirectory: drop it, keep the walk alive.
                debug!(dir = %abs_dir.display(), error = %e, "skipping unreadable directory");
                return Ok(());
            }
        };

        for entry in entries {
            if self.token.is_cancelled() {
                return Err(Halt::Canceled);
            }
            let Ok(entry) = entry else { continue };
            let name_os = entry.file_name();
            let name = name_os.to_string_lossy().into_owned();
            if name == GIT_DIR || name == AMAN_DIR {
                continue;
            }

            let rel = rel_dir.join(&name_os);
            let abs = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            let (is_dir, is_file, metadata) = if file_type.is_symlink() {
                if !self.opts.follow_symlinks {
                    continue;
                }
                match std::fs::metadata(&abs) {
                    Ok(m) => (m.is_dir(), m.is_file(), Some(m)),
                    Err(_) => continue,
                }
            } else {
                (file_type.is_dir(), file_type.is_file(), None)
            };

            if is_dir {
                if skip.contains(&rel) {
                    continue;
                }
                if exclude::is_excluded_dir_name(&name) {
                    debug!(dir = %rel.display(), "pruned built-in directory");
                    continue;
                }
                if exclude::matches_any(&self.opts.exclude, &rel) {
                    debug!(dir = %rel.display(), "pruned by user pattern");
                    continue;
                }
                if self.opts.respect_ignore_files && chain.decide(&rel, true) == Some(true) {
                    debug!(dir = %rel.display(), "pruned by ignore rules");
                    continue;
                }
                self.walk_dir(&abs, &rel, prefix, skip, chain)?;
            } else if is_file {
                self.process_file(&abs, &rel, prefix, metadata, chain)?;
            }
        }
        Ok(())
    }

    /// The layered exclusion pipeline, first hit wins.
    fn process_file(
        &self,
        abs: &Path,
        rel: &Path,
        prefix: &Path,
        metadata: Option<std::fs::Metadata>,
        chain: &MatcherChain,
    ) -> Result<(), Halt> {
        if exclude::matches_any(SENSITIVE_PATTERNS, rel) {
            debug!(file = %rel.display(), "skipped sensitive file");
            return Ok(());
        }
        if exclude::matches_any(EXCLUDED_FILES, rel) {
            return Ok(());
        }
        if exclude::matches_any(&self.opts.exclude, rel) {
            return Ok(());
        }
        if self.opts.respect_ignore_files && chain.decide(rel, false) == Some(true) {
            return Ok(());
        }
        // Includes are a post-exclusion filter: a path already excluded
        // above never comes back.
        if !self.opts.include.is_empty() && !exclude::matches_any(&self.opts.include, rel) {
            return Ok(());
        }

        let metadata = match metadata {
            Some(m) => m,
            None => match std::fs::metadata(abs) {
                Ok(m) => m,
                Err(_) => return Ok(()),
            },
        };
        if metadata.len() > self.max_size {
            debug!(file = %rel.display(), size = metadata.len(), "skipped oversized file");
            return Ok(());
        }

        let mut head = [0u8; HEAD_BYTES];
        let read = match std::fs::File::open(abs).and_then(|mut f| f.read(&mut head)) {
            Ok(n) => n,
            Err(_) => return Ok(()),
        };
        let head = &head[..read];
        if classify::is_binary(head) {
            return Ok(());
        }

        let language = classify::language(rel);
        let info = FileInfo {
            path: prefix.join(rel),
            abs_path: abs.to_path_buf(),
            size: metadata.len(),
            modified: metadata
                .modified()
                .ok()
                .map(DateTime::from)
                .unwrap_or_default(),
            class: classify::content_class(language),
            language: language.map(str::to_string),
            generated: classify::is_generated(head),
        };
        self.send(Ok(info))
    }

    /// Cancel-aware bounded send. Blocks the walking thread while the
    /// consumer catches up but never outlives a cancellation request.
    fn send(&self, mut item: ScanResult<FileInfo>) -> Result<(), Halt> {
        loop {
            if self.token.is_cancelled() {
                return Err(Halt::Canceled);
            }
            match self.tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(back)) => {
                    item = back;
                    std::thread::sleep(SEND_RETRY);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(Halt::ConsumerGone),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    async fn scan_paths(options: ScanOptions) -> Vec<String> {
        let scanner = Scanner::new();
        let stream = scanner
            .scan(options, CancellationToken::new())
            .expect("scan should start");
        let mut paths: Vec<String> = stream
            .collect()
            .await
            .expect("scan should complete")
            .into_iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn test_nested_ignore_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, ".ignore", "*.log\n");
        write(root, "src/.ignore", "temp/\n");
        write(root, "main.go", "package main\n");
        write(root, "app.log", "log\n");
        write(root, "src/app.go", "package src\n");
        write(root, "src/temp/x.txt", "x\n");
        write(root, "src/other.log", "log\n");

        let paths = scan_paths(ScanOptions::new(root)).await;
        assert_eq!(paths, vec!["main.go", "src/app.go"]);
    }

    #[tokio::test]
    async fn test_sensitive_and_builtin_exclusions() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, ".env", "SECRET=1\n");
        write(root, "deploy/server.pem", "---\n");
        write(root, "package-lock.json", "{}\n");
        write(root, "ui/app.min.js", "x\n");
        write(root, "node_modules/pkg/index.js", "x\n");
        write(root, "src/main.rs", "fn main() {}\n");

        let paths = scan_paths(ScanOptions::new(root)).await;
        assert_eq!(paths, vec!["src/main.rs"]);
    }

    #[tokio::test]
    async fn test_include_is_post_exclusion() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, ".ignore", "ignored.go\n");
        write(root, "main.go", "package main\n");
        write(root, "ignored.go", "package main\n");
        write(root, "lib.rs", "pub fn f() {}\n");

        let mut options = ScanOptions::new(root);
        options.include = vec!["*.go".to_string()];
        let paths = scan_paths(options).await;
        // The include narrows the yield; it does not resurrect ignored.go.
        assert_eq!(paths, vec!["main.go"]);
    }

    #[tokio::test]
    async fn test_user_excludes_prune_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "gen/out.rs", "x\n");
        write(root, "src/lib.rs", "x\n");

        let mut options = ScanOptions::new(root);
        options.exclude = vec!["gen/**".to_string()];
        let paths = scan_paths(options).await;
        assert_eq!(paths, vec!["src/lib.rs"]);
    }

    #[tokio::test]
    async fn test_size_and_binary_filters() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "small.txt", "ok\n");
        write(root, "big.txt", &"x".repeat(2048));
        std::fs::write(root.join("blob.dat"), b"\x00\x01\x02binary").unwrap();

        let mut options = ScanOptions::new(root);
        options.max_file_size = 1024;
        let paths = scan_paths(options).await;
        assert_eq!(paths, vec!["small.txt"]);
    }

    #[tokio::test]
    async fn test_generated_files_flagged_but_yielded() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "api.pb.go", "// Code generated by protoc. DO NOT EDIT.\n");
        write(root, "main.go", "package main\n");

        let scanner = Scanner::new();
        let files = scanner
            .scan(ScanOptions::new(root), CancellationToken::new())
            .unwrap()
            .collect()
            .await
            .unwrap();
        let generated: Vec<bool> = {
            let mut sorted = files.clone();
            sorted.sort_by(|a, b| a.path.cmp(&b.path));
            sorted.iter().map(|f| f.generated).collect()
        };
        assert_eq!(generated, vec![true, false]);
    }

    #[tokio::test]
    async fn test_classification_on_yielded_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "main.go", "package main\n");

        let scanner = Scanner::new();
        let files = scanner
            .scan(ScanOptions::new(root), CancellationToken::new())
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].language.as_deref(), Some("go"));
        assert_eq!(files[0].class, crate::info::ContentClass::Code);
        assert!(files[0].size > 0);
    }

    #[tokio::test]
    async fn test_cancellation_surfaces_terminal_error() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        for i in 0..50 {
            write(root, &format!("file{i}.txt"), "content\n");
        }

        let token = CancellationToken::new();
        token.cancel();
        let scanner = Scanner::new();
        let mut stream = scanner.scan(ScanOptions::new(root), token).unwrap();

        let mut canceled = false;
        while let Some(item) = stream.recv().await {
            match item {
                Ok(_) => {}
                Err(ScanError::Canceled) => {
                    canceled = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(canceled);
    }

    #[tokio::test]
    async fn test_invalid_root_rejected_up_front() {
        let scanner = Scanner::new();
        let result = scanner.scan(
            ScanOptions::new("/definitely/not/here"),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(ScanError::InvalidRoot(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_skipped_by_default() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "real.txt", "content\n");
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("link.txt")).unwrap();

        let paths = scan_paths(ScanOptions::new(root)).await;
        assert_eq!(paths, vec!["real.txt"]);

        let mut options = ScanOptions::new(root);
        options.follow_symlinks = true;
        let paths = scan_paths(options).await;
        assert_eq!(paths, vec!["link.txt", "real.txt"]);
    }

    #[tokio::test]
    async fn test_scan_subtree_reports_root_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, ".ignore", "*.log\n");
        write(root, "src/app.go", "package src\n");
        write(root, "src/debug.log", "log\n");
        write(root, "main.go", "package main\n");

        let scanner = Scanner::new();
        let stream = scanner
            .scan_subtree(
                ScanOptions::new(root),
                Path::new("src"),
                CancellationToken::new(),
            )
            .unwrap();
        let mut paths: Vec<String> = stream
            .collect()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.path.to_string_lossy().into_owned())
            .collect();
        paths.sort();
        // Root-level rules still apply inside the subtree, and paths stay
        // relative to the project root.
        assert_eq!(paths, vec!["src/app.go"]);
    }
}
