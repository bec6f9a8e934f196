//! Per-path event coalescing.
//!
//! Editors write-then-rename, IDEs touch dozens of files on save, and
//! package managers create and delete temporaries in bursts. The
//! debouncer absorbs those bursts: events for one path merge according to
//! a small algebra keyed on the *first* operation seen in the window, and
//! the whole pending set drains as one batch once the window goes quiet.
//!
//! The merge table:
//!
//! | first  | new    | result                        |
//! |--------|--------|-------------------------------|
//! | Create | Modify | Create                        |
//! | Create | Delete | event cancelled               |
//! | Create | Create | Create (latest metadata)      |
//! | Modify | Modify | Modify                        |
//! | Modify | Delete | Delete                        |
//! | Modify | Create | Modify                        |
//! | Delete | Create | Modify (file replaced)        |
//! | Delete | other  | new operation                 |
//! | Rename | any    | latest operation              |
//!
//! A rename merges with the pending entry of its *source* path and the
//! result is re-keyed by the destination, so a write-then-rename save
//! leaves the window as one event.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{FileEvent, Operation};

/// Default coalescing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(200);

/// Default capacity of the batch output channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1000;

/// Coalesces raw events into batches.
///
/// Clones share one pending set. Must be created inside a tokio runtime;
/// the flush timer runs as its own task until [`Debouncer::stop`].
#[derive(Clone)]
pub struct Debouncer {
    shared: Arc<Shared>,
}

struct Shared {
    window: Duration,
    state: Mutex<State>,
    /// Taken on stop so the output channel closes.
    tx: Mutex<Option<mpsc::Sender<Vec<FileEvent>>>>,
    wake: Notify,
    token: CancellationToken,
    dropped: AtomicU64,
    stopped: AtomicBool,
}

struct State {
    pending: HashMap<PathBuf, Pending>,
    /// Synthetic events ride the same batches but skip coalescing.
    specials: Vec<FileEvent>,
    deadline: Option<Instant>,
}

/// A coalesced event plus the first operation observed for its path,
/// which drives the merge algebra.
struct Pending {
    first: Operation,
    event: FileEvent,
}

impl Debouncer {
    /// Create a debouncer and the receiving end of its batch channel.
    pub fn new(window: Duration, buffer: usize) -> (Self, mpsc::Receiver<Vec<FileEvent>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let shared = Arc::new(Shared {
            window,
            state: Mutex::new(State {
                pending: HashMap::new(),
                specials: Vec::new(),
                deadline: None,
            }),
            tx: Mutex::new(Some(tx)),
            wake: Notify::new(),
            token: CancellationToken::new(),
            dropped: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        });
        tokio::spawn(flush_loop(shared.clone()));
        (Self { shared }, rx)
    }

    /// Feed one raw event. Re-arms the flush timer; events arriving after
    /// stop are discarded.
    pub fn enqueue(&self, event: FileEvent) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut state = self.shared.state.lock();
            if event.op.is_synthetic() {
                let duplicate = state
                    .specials
                    .iter()
                    .any(|e| e.op == event.op && e.path == event.path);
                if !duplicate {
                    state.specials.push(event);
                }
            } else {
                merge_into(&mut state.pending, event);
            }
            state.deadline = Some(Instant::now() + self.shared.window);
        }
        self.shared.wake.notify_one();
    }

    /// Batches dropped because the consumer fell behind.
    pub fn dropped_batches(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop the flush task and close the output channel. Idempotent and
    /// safe against concurrent callers; pending events are discarded.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.token.cancel();
        self.shared.tx.lock().take();
        debug!("debouncer stopped");
    }
}

fn merge_into(pending: &mut HashMap<PathBuf, Pending>, mut incoming: FileEvent) {
    use Operation::*;

    // A rename joins the pending slot its source path occupies; whatever
    // survives is re-keyed by the destination so the window never flushes
    // a phantom event for a path that no longer exists.
    let mut carried_first = None;
    if incoming.op == Rename {
        if let Some(source) = incoming.old_path.clone() {
            if let Some(prior) = pending.remove(&source) {
                if prior.first == Create {
                    // The consumer never saw the source path; all that is
                    // visible is the file appearing at the destination.
                    incoming.op = Create;
                    incoming.old_path = None;
                }
                carried_first = Some(prior.first);
            }
        }
    }

    match pending.entry(incoming.path.clone()) {
        Entry::Vacant(slot) => {
            slot.insert(Pending {
                first: carried_first.unwrap_or(incoming.op),
                event: incoming,
            });
        }
        Entry::Occupied(mut slot) => match (slot.get().first, incoming.op) {
            // Created and deleted inside one window: nothing happened.
            (Create, Delete) => {
                slot.remove();
            }
            // A file the consumer has never seen stays a Create, whatever
            // happens to it meanwhile.
            (Create, _) => {
                let pending = slot.get_mut();
                pending.event.is_dir = incoming.is_dir;
                pending.event.timestamp = incoming.timestamp;
            }
            // Replaced content on a path the consumer already knows.
            (Modify, Create) | (Delete, Create) => {
                let mut event = incoming;
                event.op = Modify;
                slot.get_mut().event = event;
            }
            _ => {
                slot.get_mut().event = incoming;
            }
        },
    }
}

async fn flush_loop(shared: Arc<Shared>) {
    loop {
        tokio::select! {
            _ = shared.token.cancelled() => break,
            _ = shared.wake.notified() => {}
        }
        // Keep sleeping until the deadline stops moving, then drain.
        loop {
            let deadline = shared.state.lock().deadline;
            let Some(deadline) = deadline else { break };
            tokio::select! {
                _ = shared.token.cancelled() => return,
                _ = shared.wake.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let fire = {
                        let mut state = shared.state.lock();
                        if state.deadline == Some(deadline) {
                            state.deadline = None;
                            true
                        } else {
                            false
                        }
                    };
                    if fire {
                        flush(&shared);
                    }
                }
            }
        }
    }
}

fn flush(shared: &Shared) {
    let batch: Vec<FileEvent> = {
        let mut state = shared.state.lock();
        let mut batch: Vec<FileEvent> = state.specials.drain(..).collect();
        batch.extend(state.pending.drain().map(|(_, p)| p.event));
        batch
    };
    if batch.is_empty() {
        return;
    }

    // Never send while holding the state lock.
    let tx = shared.tx.lock().clone();
    let Some(tx) = tx else { return };
    match tx.try_send(batch) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            let total = shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped_batches = total, "event channel full, dropping batch");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}
