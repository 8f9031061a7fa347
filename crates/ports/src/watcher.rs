//! File watcher boundary contracts (local-watch mode).

use crate::BoxFuture;
use chrono::{DateTime, Utc};
use codesync_shared::{RequestContext, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Kind of a raw filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// A file appeared.
    Add,
    /// A file's content changed.
    Change,
    /// A file disappeared.
    Unlink,
}

/// A raw filesystem event from the upstream watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFileEvent {
    /// Event kind.
    pub kind: RawEventKind,
    /// Absolute path of the affected file.
    pub absolute_path: PathBuf,
    /// Path relative to the watched root.
    pub relative_path: String,
    /// Identifier of the watched root.
    pub folder_id: String,
    /// Absolute path of the watched root.
    pub folder_path: PathBuf,
    /// Lowercased extension without the dot.
    pub extension: String,
    /// When the event was observed.
    pub timestamp: DateTime<Utc>,
}

/// Handler invoked for every raw event, in arrival order.
pub type RawEventHandler = Arc<dyn Fn(RawFileEvent) + Send + Sync>;

/// Opaque subscription handle returned by [`FileWatcherPort::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchSubscription(pub u64);

/// Boundary contract for the upstream filesystem watcher.
pub trait FileWatcherPort: Send + Sync {
    /// Register a handler for raw events.
    fn subscribe(&self, handler: RawEventHandler) -> WatchSubscription;

    /// Remove a previously registered handler.
    fn unsubscribe(&self, subscription: WatchSubscription);
}

/// Minimal file stat used by the change categorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStatInfo {
    /// File size in bytes.
    pub size_bytes: u64,
    /// Filesystem modification time.
    pub modified_at: DateTime<Utc>,
}

/// Boundary contract for stat'ing watched files.
pub trait FileStatPort: Send + Sync {
    /// Stat an absolute path. `Ok(None)` when the file does not exist.
    fn stat(
        &self,
        ctx: &RequestContext,
        absolute_path: &Path,
    ) -> BoxFuture<'_, Result<Option<FileStatInfo>>>;
}
