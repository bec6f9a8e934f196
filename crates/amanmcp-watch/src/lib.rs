//! # amanmcp-watch — filesystem observation for incremental indexing
//!
//! Watches a project tree and delivers batches of coalesced
//! [`FileEvent`]s to the indexer. Kernel event sources are preferred;
//! when one cannot be created the watcher silently degrades to a polling
//! backend with the same event pipeline.
//!
//! Raw events pass through three stages:
//!
//! 1. **Routing**: version-control and service-private paths are always
//!    suppressed; ignore-file and configuration-file mutations become
//!    synthetic [`Operation::IgnoreRulesChanged`] /
//!    [`Operation::ConfigChanged`] events (and trigger a matcher
//!    reload); everything else is filtered through the active ignore
//!    matcher.
//! 2. **Coalescing**: the [`Debouncer`] merges bursts per path over a
//!    window, so an editor's write-then-rename dance arrives as one
//!    event.
//! 3. **Batching**: coalesced events leave through a bounded channel.
//!    Under overload, whole batches are dropped (counted, observable)
//!    rather than blocking the producer.

pub mod debounce;
pub mod error;
pub mod event;
pub mod watcher;

pub use debounce::{Debouncer, DEFAULT_EVENT_BUFFER, DEFAULT_WINDOW};
pub use error::{WatchError, WatchResult};
pub use event::{FileEvent, Operation};
pub use watcher::{WatchMode, WatchOptions, Watcher, WatcherStatus, DEFAULT_POLL_INTERVAL};
