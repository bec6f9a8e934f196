//! Hybrid filesystem watcher.
//!
//! Prefers the kernel event source (inotify / FSEvents / ReadDirectory-
//! ChangesW via `notify`); when that cannot be created or attached, it
//! degrades to `notify`'s polling backend, which re-walks the tree each
//! interval and compares modification time and size. Both backends feed
//! the same routing pipeline and debouncer, so consumers never see the
//! difference except through [`Watcher::status`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use amanmcp_ignore::{IgnoreMatcher, MatcherCell, AMAN_DIR, CONFIG_FILES, GIT_DIR, IGNORE_FILE};

use crate::debounce::{Debouncer, DEFAULT_EVENT_BUFFER, DEFAULT_WINDOW};
use crate::error::{WatchError, WatchResult};
use crate::event::{FileEvent, Operation};

/// Default re-walk interval for the polling backend.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Options for one watch session.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Directory tree to observe. Must exist and be a directory.
    pub root: PathBuf,

    /// Coalescing window for the debouncer.
    pub debounce_window: Duration,

    /// Re-walk interval when the polling backend is active.
    pub poll_interval: Duration,

    /// Capacity of the outgoing batch channel.
    pub event_buffer: usize,

    /// In-process ignore patterns, composed before the tree's ignore
    /// files.
    pub ignore_patterns: Vec<String>,

    /// Skip the kernel backend entirely. Mostly useful on filesystems
    /// that swallow events (network mounts) and in tests.
    pub force_polling: bool,
}

impl WatchOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce_window: DEFAULT_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_buffer: DEFAULT_EVENT_BUFFER,
            ignore_patterns: Vec::new(),
            force_polling: false,
        }
    }
}

/// Which backend a watcher ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    FsNotify,
    Polling,
}

impl WatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WatchMode::FsNotify => "fsnotify",
            WatchMode::Polling => "polling",
        }
    }
}

impl std::fmt::Display for WatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a watcher's state.
#[derive(Debug, Clone)]
pub struct WatcherStatus {
    pub mode: WatchMode,
    pub root: PathBuf,
    /// Running and not stopped.
    pub healthy: bool,
    pub dropped_batches: u64,
}

/// The live backend; dropped on stop to release the native resources.
enum WatcherBackend {
    Event(RecommendedWatcher),
    Poll(PollWatcher),
}

impl WatcherBackend {
    fn mode(&self) -> WatchMode {
        match self {
            WatcherBackend::Event(_) => WatchMode::FsNotify,
            WatcherBackend::Poll(_) => WatchMode::Polling,
        }
    }
}

/// Observes a project tree and emits coalesced event batches.
pub struct Watcher {
    shared: Arc<Shared>,
}

struct Shared {
    root: PathBuf,
    mode: WatchMode,
    matcher: MatcherCell,
    ignore_patterns: Vec<String>,
    debouncer: Debouncer,
    token: CancellationToken,
    stopped: AtomicBool,
    backend: Mutex<Option<WatcherBackend>>,
}

type RawEvent = Result<notify::Event, notify::Error>;

impl Watcher {
    /// Start watching. Returns the watcher handle and the batch channel;
    /// the channel closes when the watcher stops or the caller's token
    /// cancels.
    pub async fn start(
        options: WatchOptions,
        token: CancellationToken,
    ) -> WatchResult<(Watcher, mpsc::Receiver<Vec<FileEvent>>)> {
        let root = options
            .root
            .canonicalize()
            .map_err(|_| WatchError::InvalidRoot(options.root.clone()))?;
        if !root.is_dir() {
            return Err(WatchError::InvalidRoot(options.root));
        }

        let matcher = {
            let root = root.clone();
            let patterns = options.ignore_patterns.clone();
            tokio::task::spawn_blocking(move || IgnoreMatcher::from_root(&root, &patterns))
                .await
                .map_err(|e| WatchError::TaskJoin(e.to_string()))??
        };

        let (debouncer, events_rx) = Debouncer::new(options.debounce_window, options.event_buffer);
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawEvent>();

        let backend = create_backend(&root, &options, raw_tx)?;
        info!(root = %root.display(), mode = backend.mode().as_str(), "watcher started");

        let shared = Arc::new(Shared {
            mode: backend.mode(),
            root,
            matcher: MatcherCell::new(matcher),
            ignore_patterns: options.ignore_patterns,
            debouncer,
            token: token.child_token(),
            stopped: AtomicBool::new(false),
            backend: Mutex::new(Some(backend)),
        });
        tokio::spawn(event_loop(shared.clone(), raw_rx));

        Ok((Watcher { shared }, events_rx))
    }

    /// Stop watching: releases the native watcher, stops the debouncer,
    /// and closes the batch channel. Idempotent and safe against
    /// concurrent callers; no event is delivered after it returns.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.token.cancel();
        self.shared.backend.lock().take();
        self.shared.debouncer.stop();
        info!(root = %self.shared.root.display(), "watcher stopped");
    }

    /// Cheap read-only snapshot: backend mode, watched root, health, and
    /// the dropped-batch count.
    pub fn status(&self) -> WatcherStatus {
        WatcherStatus {
            mode: self.shared.mode,
            root: self.shared.root.clone(),
            healthy: !self.shared.stopped.load(Ordering::SeqCst)
                && !self.shared.token.is_cancelled(),
            dropped_batches: self.shared.debouncer.dropped_batches(),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn create_backend(
    root: &Path,
    options: &WatchOptions,
    raw_tx: mpsc::UnboundedSender<RawEvent>,
) -> WatchResult<WatcherBackend> {
    if !options.force_polling {
        let tx = raw_tx.clone();
        let handler = move |res: RawEvent| {
            let _ = tx.send(res);
        };
        match RecommendedWatcher::new(handler, notify::Config::default()) {
            Ok(mut watcher) => match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => return Ok(WatcherBackend::Event(watcher)),
                Err(e) => warn!(error = %e, "native watch failed, falling back to polling"),
            },
            Err(e) => warn!(error = %e, "native watcher unavailable, falling back to polling"),
        }
    }

    let handler = move |res: RawEvent| {
        let _ = raw_tx.send(res);
    };
    let config = notify::Config::default()
        .with_poll_interval(options.poll_interval)
        .with_compare_contents(false);
    let mut watcher = PollWatcher::new(handler, config)?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(WatcherBackend::Poll(watcher))
}

async fn event_loop(shared: Arc<Shared>, mut raw_rx: mpsc::UnboundedReceiver<RawEvent>) {
    loop {
        tokio::select! {
            _ = shared.token.cancelled() => break,
            next = raw_rx.recv() => match next {
                None => break,
                Some(Ok(event)) => handle_event(&shared, event).await,
                Some(Err(e)) => warn!(error = %e, "watch backend error"),
            }
        }
    }
    // Cancellation alone must release resources: drop the native watcher
    // so it stops producing into a channel nothing drains anymore.
    shared.backend.lock().take();
    shared.debouncer.stop();
    debug!("watcher event loop exited");
}

async fn handle_event(shared: &Arc<Shared>, event: notify::Event) {
    // Rename pairs carry both endpoints in one event.
    if matches!(
        event.kind,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both))
    ) && event.paths.len() == 2
    {
        handle_rename(shared, &event.paths[0], &event.paths[1]).await;
        return;
    }

    let Some(op) = convert_kind(&event.kind) else {
        return;
    };
    for path in &event.paths {
        let Some(rel) = relativize(&shared.root, path) else {
            continue;
        };
        let is_dir = path.is_dir();
        match route(&rel, is_dir, &shared.matcher.load()) {
            Route::Suppress => {}
            Route::IgnoreChange => {
                reload_matcher(shared).await;
                shared
                    .debouncer
                    .enqueue(FileEvent::new(Operation::IgnoreRulesChanged, rel, false));
            }
            Route::ConfigChange => shared
                .debouncer
                .enqueue(FileEvent::new(Operation::ConfigChanged, rel, false)),
            Route::Deliver => shared.debouncer.enqueue(FileEvent::new(op, rel, is_dir)),
        }
    }
}

async fn handle_rename(shared: &Arc<Shared>, from: &Path, to: &Path) {
    let from_rel = relativize(&shared.root, from);
    let to_rel = relativize(&shared.root, to);
    let is_dir = to.is_dir();
    let matcher = shared.matcher.load();

    let from_route = from_rel.as_deref().map(|r| route(r, is_dir, &matcher));
    let to_route = to_rel.as_deref().map(|r| route(r, is_dir, &matcher));

    // Renaming an ignore file in or out of place changes the rules.
    let ignore_changed = matches!(from_route, Some(Route::IgnoreChange))
        || matches!(to_route, Some(Route::IgnoreChange));
    if ignore_changed {
        reload_matcher(shared).await;
        if let Some(rel) = to_rel.or(from_rel) {
            shared
                .debouncer
                .enqueue(FileEvent::new(Operation::IgnoreRulesChanged, rel, false));
        }
        return;
    }

    match (from_route, to_route) {
        (_, Some(Route::Deliver)) => {
            if let (Some(from_rel), Some(to_rel)) = (from_rel, to_rel) {
                shared
                    .debouncer
                    .enqueue(FileEvent::rename(from_rel, to_rel, is_dir));
            }
        }
        // Moved into an ignored or suppressed location: the visible file
        // is gone.
        (Some(Route::Deliver), _) => {
            if let Some(from_rel) = from_rel {
                shared
                    .debouncer
                    .enqueue(FileEvent::new(Operation::Delete, from_rel, is_dir));
            }
        }
        _ => {}
    }
}

async fn reload_matcher(shared: &Arc<Shared>) {
    let root = shared.root.clone();
    let patterns = shared.ignore_patterns.clone();
    match tokio::task::spawn_blocking(move || IgnoreMatcher::from_root(&root, &patterns)).await {
        Ok(Ok(matcher)) => {
            shared.matcher.store(matcher);
            debug!("ignore rules reloaded");
        }
        Ok(Err(e)) => warn!(error = %e, "failed to reload ignore rules, keeping previous"),
        Err(e) => warn!(error = %e, "ignore reload task failed"),
    }
}

fn relativize(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(|p| p.to_path_buf())
}

/// Where a converted event goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// Metadata directories, the service directory, and ignored paths.
    Suppress,
    /// An ignore file changed: reload rules, emit a synthetic event.
    IgnoreChange,
    /// A service configuration file changed.
    ConfigChange,
    Deliver,
}

fn route(rel: &Path, is_dir: bool, matcher: &IgnoreMatcher) -> Route {
    if rel.as_os_str().is_empty() || rel == Path::new(".") {
        return Route::Suppress;
    }
    if let Some(first) = rel.components().next() {
        let first = first.as_os_str();
        if first == GIT_DIR || first == AMAN_DIR {
            return Route::Suppress;
        }
    }
    if rel.file_name().is_some_and(|n| n == IGNORE_FILE) {
        return Route::IgnoreChange;
    }
    if rel.components().count() == 1 {
        if let Some(name) = rel.file_name().and_then(|n| n.to_str()) {
            if CONFIG_FILES.contains(&name) {
                return Route::ConfigChange;
            }
        }
    }
    if matcher.is_ignored(rel, is_dir) {
        return Route::Suppress;
    }
    Route::Deliver
}

fn convert_kind(kind: &EventKind) -> Option<Operation> {
    match kind {
        EventKind::Create(_) => Some(Operation::Create),
        EventKind::Remove(_) => Some(Operation::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Operation::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Operation::Create),
        // Permission and timestamp churn carries no content change.
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(Operation::Modify),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}
