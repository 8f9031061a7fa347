//! Change categorizer for local-watch mode.
//!
//! Converts raw watcher events (add/change/unlink) into semantic changes
//! (added/modified/deleted/renamed). An unlink opens a pending entry keyed
//! by `(folder_id, basename)`; an add on the same key within the rename
//! window consumes it into a single renamed event, otherwise the window
//! timer emits a deleted event. The timer-fired path and the match path
//! both remove the entry from the map under one lock before acting, so
//! exactly one of them wins.

use chrono::Utc;
use codesync_domain::{ChangeCategory, DetectedChange, FileState};
use codesync_ports::{
    FileStatPort, FileWatcherPort, LoggerPort, RawEventKind, RawFileEvent, WatchSubscription,
};
use codesync_shared::RequestContext;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Base confidence for a basename match within the window.
const RENAME_CONFIDENCE_BASE: f64 = 0.7;
/// Confidence when both sides carry state and sizes match.
const RENAME_CONFIDENCE_SIZE_MATCH: f64 = 0.9;

/// Callback receiving detected changes, in detection order.
pub type ChangeSink = Arc<dyn Fn(DetectedChange) + Send + Sync>;

/// Categorizer tuning.
#[derive(Debug, Clone)]
pub struct ChangeCategorizerOptions {
    /// Pending-unlink lifetime.
    pub rename_window: Duration,
    /// Whether to stat files and keep per-file state.
    pub track_state: bool,
}

impl Default for ChangeCategorizerOptions {
    fn default() -> Self {
        Self {
            rename_window: Duration::from_millis(500),
            track_state: true,
        }
    }
}

/// Rename-correlating change categorizer.
pub struct ChangeCategorizer {
    inner: Arc<Inner>,
    watcher: Arc<dyn FileWatcherPort>,
    subscription: WatchSubscription,
    sender: mpsc::UnboundedSender<RawFileEvent>,
    processor: JoinHandle<()>,
}

struct Inner {
    options: ChangeCategorizerOptions,
    ctx: RequestContext,
    stat: Arc<dyn FileStatPort>,
    sink: ChangeSink,
    logger: Option<Arc<dyn LoggerPort>>,
    state: Mutex<CategorizerState>,
}

#[derive(Default)]
struct CategorizerState {
    file_states: HashMap<PathBuf, FileState>,
    pending_unlinks: HashMap<PendingKey, PendingUnlink>,
}

type PendingKey = (String, String);

struct PendingUnlink {
    absolute_path: PathBuf,
    relative_path: String,
    folder_id: String,
    previous_state: Option<FileState>,
    timer: JoinHandle<()>,
}

impl ChangeCategorizer {
    /// Subscribe to the watcher and start processing events in arrival
    /// order.
    #[must_use]
    pub fn start(
        watcher: Arc<dyn FileWatcherPort>,
        stat: Arc<dyn FileStatPort>,
        options: ChangeCategorizerOptions,
        sink: ChangeSink,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<RawFileEvent>();
        let inner = Arc::new(Inner {
            options,
            ctx: RequestContext::new_operation(),
            stat,
            sink,
            logger,
            state: Mutex::new(CategorizerState::default()),
        });

        let processor_inner = Arc::clone(&inner);
        let processor = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                Inner::handle_event(&processor_inner, event).await;
            }
        });

        let event_sender = sender.clone();
        let subscription = watcher.subscribe(Arc::new(move |event| {
            // The channel only closes on dispose; late events are dropped.
            let _ = event_sender.send(event);
        }));

        Self {
            inner,
            watcher,
            subscription,
            sender,
            processor,
        }
    }

    /// Stop watching: cancel every pending-unlink timer, drain pending
    /// entries as deleted events, and clear all state.
    pub async fn dispose(self) {
        self.watcher.unsubscribe(self.subscription);
        drop(self.sender);
        // Let queued events finish in order before draining.
        let _ = self.processor.await;

        let drained: Vec<PendingUnlink> = {
            let mut state = lock_state(&self.inner.state);
            state.file_states.clear();
            state.pending_unlinks.drain().map(|(_, pending)| pending).collect()
        };
        for pending in drained {
            pending.timer.abort();
            self.inner.emit_deleted(pending);
        }
    }

    /// Number of unresolved pending unlinks (test observability).
    #[must_use]
    pub fn pending_unlink_count(&self) -> usize {
        lock_state(&self.inner.state).pending_unlinks.len()
    }
}

fn lock_state(state: &Mutex<CategorizerState>) -> std::sync::MutexGuard<'_, CategorizerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Inner {
    async fn handle_event(inner: &Arc<Self>, event: RawFileEvent) {
        match event.kind {
            RawEventKind::Add => inner.handle_add(event).await,
            RawEventKind::Change => inner.handle_change(event).await,
            RawEventKind::Unlink => Self::handle_unlink(inner, event),
        }
    }

    async fn handle_add(&self, event: RawFileEvent) {
        let key = (event.folder_id.clone(), basename(&event.absolute_path));
        let matched = lock_state(&self.state).pending_unlinks.remove(&key);

        let current_state = self.capture_state(&event).await;
        if let Some(state) = current_state.clone() {
            lock_state(&self.state)
                .file_states
                .insert(event.absolute_path.clone(), state);
        }

        match matched {
            Some(pending) => {
                pending.timer.abort();
                let confidence = rename_confidence(pending.previous_state.as_ref(), current_state.as_ref());
                (self.sink)(DetectedChange {
                    category: ChangeCategory::Renamed,
                    absolute_path: event.absolute_path,
                    relative_path: event.relative_path,
                    previous_relative_path: Some(pending.relative_path),
                    folder_id: event.folder_id,
                    current_state,
                    previous_state: pending.previous_state,
                    confidence: Some(confidence),
                    detected_at: Utc::now(),
                });
            },
            None => {
                (self.sink)(DetectedChange {
                    category: ChangeCategory::Added,
                    absolute_path: event.absolute_path,
                    relative_path: event.relative_path,
                    previous_relative_path: None,
                    folder_id: event.folder_id,
                    current_state,
                    previous_state: None,
                    confidence: None,
                    detected_at: Utc::now(),
                });
            },
        }
    }

    async fn handle_change(&self, event: RawFileEvent) {
        let previous_state = lock_state(&self.state)
            .file_states
            .get(&event.absolute_path)
            .cloned();
        let current_state = self.capture_state(&event).await;
        if let Some(state) = current_state.clone() {
            lock_state(&self.state)
                .file_states
                .insert(event.absolute_path.clone(), state);
        }
        (self.sink)(DetectedChange {
            category: ChangeCategory::Modified,
            absolute_path: event.absolute_path,
            relative_path: event.relative_path,
            previous_relative_path: None,
            folder_id: event.folder_id,
            current_state,
            previous_state,
            confidence: None,
            detected_at: Utc::now(),
        });
    }

    fn handle_unlink(inner: &Arc<Self>, event: RawFileEvent) {
        let previous_state = lock_state(&inner.state)
            .file_states
            .remove(&event.absolute_path);
        let key = (event.folder_id.clone(), basename(&event.absolute_path));

        let weak: Weak<Self> = Arc::downgrade(inner);
        let timer_key = key.clone();
        let window = inner.options.rename_window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire_pending(&timer_key);
            }
        });

        let replaced = lock_state(&inner.state).pending_unlinks.insert(
            key,
            PendingUnlink {
                absolute_path: event.absolute_path,
                relative_path: event.relative_path,
                folder_id: event.folder_id,
                previous_state,
                timer,
            },
        );
        // A second unlink on the same key flushes the first as deleted.
        if let Some(previous) = replaced {
            previous.timer.abort();
            inner.emit_deleted(previous);
        }
    }

    /// Timer path: emits deleted unless a matching add already consumed the
    /// entry.
    fn fire_pending(&self, key: &PendingKey) {
        let pending = lock_state(&self.state).pending_unlinks.remove(key);
        if let Some(pending) = pending {
            self.emit_deleted(pending);
        }
    }

    fn emit_deleted(&self, pending: PendingUnlink) {
        (self.sink)(DetectedChange {
            category: ChangeCategory::Deleted,
            absolute_path: pending.absolute_path,
            relative_path: pending.relative_path,
            previous_relative_path: None,
            folder_id: pending.folder_id,
            current_state: None,
            previous_state: pending.previous_state,
            confidence: None,
            detected_at: Utc::now(),
        });
    }

    /// Stat failures never suppress the change event; the state is `None`.
    async fn capture_state(&self, event: &RawFileEvent) -> Option<FileState> {
        if !self.options.track_state {
            return None;
        }
        match self.stat.stat(&self.ctx, &event.absolute_path).await {
            Ok(Some(info)) => Some(FileState {
                absolute_path: event.absolute_path.clone(),
                relative_path: event.relative_path.clone(),
                size_bytes: info.size_bytes,
                modified_at: info.modified_at,
                extension: event.extension.clone(),
                captured_at: Utc::now(),
            }),
            Ok(None) => None,
            Err(error) => {
                if let Some(logger) = self.logger.as_ref() {
                    logger.warn(
                        "watch.stat_failed",
                        &format!(
                            "stat failed for {}: {}",
                            event.absolute_path.display(),
                            error.message
                        ),
                        None,
                    );
                }
                None
            },
        }
    }
}

fn rename_confidence(previous: Option<&FileState>, current: Option<&FileState>) -> f64 {
    match (previous, current) {
        (Some(previous), Some(current)) if previous.size_bytes == current.size_bytes => {
            RENAME_CONFIDENCE_SIZE_MATCH
        },
        _ => RENAME_CONFIDENCE_BASE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_testkit::{ManualWatcher, StaticStats};

    struct Harness {
        watcher: Arc<ManualWatcher>,
        stats: Arc<StaticStats>,
        changes: Arc<Mutex<Vec<DetectedChange>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                watcher: Arc::new(ManualWatcher::new()),
                stats: Arc::new(StaticStats::new()),
                changes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn start(&self) -> ChangeCategorizer {
            let sink_changes = self.changes.clone();
            ChangeCategorizer::start(
                self.watcher.clone(),
                self.stats.clone(),
                ChangeCategorizerOptions::default(),
                Arc::new(move |change| {
                    let mut guard = sink_changes
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    guard.push(change);
                }),
                None,
            )
        }

        fn event(&self, kind: RawEventKind, absolute: &str, relative: &str) -> RawFileEvent {
            RawFileEvent {
                kind,
                absolute_path: PathBuf::from(absolute),
                relative_path: relative.to_string(),
                folder_id: "root-a".to_string(),
                folder_path: PathBuf::from("/watch/a"),
                extension: "ts".to_string(),
                timestamp: Utc::now(),
            }
        }

        fn collected(&self) -> Vec<DetectedChange> {
            self.changes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unlink_then_add_within_window_is_a_rename() {
        let harness = Harness::new();
        let categorizer = harness.start();
        harness.stats.set(Path::new("/watch/a/b/f.ts"), 64);

        harness
            .watcher
            .emit(&harness.event(RawEventKind::Unlink, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        harness
            .watcher
            .emit(&harness.event(RawEventKind::Add, "/watch/a/b/f.ts", "b/f.ts"));
        tokio::time::sleep(Duration::from_millis(600)).await;

        let changes = harness.collected();
        assert_eq!(changes.len(), 1, "expected a single rename event");
        let rename = &changes[0];
        assert_eq!(rename.category, ChangeCategory::Renamed);
        assert_eq!(rename.relative_path, "b/f.ts");
        assert_eq!(rename.previous_relative_path.as_deref(), Some("f.ts"));
        assert!(rename.confidence.is_some_and(|c| c >= RENAME_CONFIDENCE_BASE));
        assert_eq!(categorizer.pending_unlink_count(), 0);
        categorizer.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_unlink_becomes_deleted_after_the_window() {
        let harness = Harness::new();
        let categorizer = harness.start();

        harness
            .watcher
            .emit(&harness.event(RawEventKind::Unlink, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(600)).await;

        let changes = harness.collected();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].category, ChangeCategory::Deleted);
        assert_eq!(changes[0].relative_path, "f.ts");
        categorizer.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rename_confidence_rises_when_sizes_match() {
        let harness = Harness::new();
        let categorizer = harness.start();

        // Track the original file so the unlink carries previous state.
        harness.stats.set(Path::new("/watch/a/f.ts"), 64);
        harness
            .watcher
            .emit(&harness.event(RawEventKind::Add, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        harness.stats.unset(Path::new("/watch/a/f.ts"));
        harness
            .watcher
            .emit(&harness.event(RawEventKind::Unlink, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        harness.stats.set(Path::new("/watch/a/moved/f.ts"), 64);
        harness
            .watcher
            .emit(&harness.event(RawEventKind::Add, "/watch/a/moved/f.ts", "moved/f.ts"));
        tokio::time::sleep(Duration::from_millis(600)).await;

        let changes = harness.collected();
        assert_eq!(changes.len(), 2, "add then rename");
        let rename = &changes[1];
        assert_eq!(rename.category, ChangeCategory::Renamed);
        assert_eq!(rename.confidence, Some(RENAME_CONFIDENCE_SIZE_MATCH));
        categorizer.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn modified_carries_previous_and_current_state() {
        let harness = Harness::new();
        let categorizer = harness.start();

        harness.stats.set(Path::new("/watch/a/f.ts"), 10);
        harness
            .watcher
            .emit(&harness.event(RawEventKind::Add, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        harness.stats.set(Path::new("/watch/a/f.ts"), 20);
        harness
            .watcher
            .emit(&harness.event(RawEventKind::Change, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let changes = harness.collected();
        assert_eq!(changes.len(), 2);
        let modified = &changes[1];
        assert_eq!(modified.category, ChangeCategory::Modified);
        assert_eq!(
            modified.previous_state.as_ref().map(|s| s.size_bytes),
            Some(10)
        );
        assert_eq!(
            modified.current_state.as_ref().map(|s| s.size_bytes),
            Some(20)
        );
        categorizer.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stat_failure_never_suppresses_the_event() {
        let harness = Harness::new();
        let categorizer = harness.start();

        // No stat scripted for the path: state is simply None.
        harness
            .watcher
            .emit(&harness.event(RawEventKind::Add, "/watch/a/ghost.ts", "ghost.ts"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let changes = harness.collected();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].category, ChangeCategory::Added);
        assert!(changes[0].current_state.is_none());
        categorizer.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_drains_pending_unlinks_as_deleted() {
        let harness = Harness::new();
        let categorizer = harness.start();

        harness
            .watcher
            .emit(&harness.event(RawEventKind::Unlink, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(categorizer.pending_unlink_count(), 1);

        categorizer.dispose().await;

        let changes = harness.collected();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].category, ChangeCategory::Deleted);
        assert_eq!(harness.watcher.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cross_root_unlink_add_does_not_correlate() {
        let harness = Harness::new();
        let categorizer = harness.start();

        harness
            .watcher
            .emit(&harness.event(RawEventKind::Unlink, "/watch/a/f.ts", "f.ts"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut foreign = harness.event(RawEventKind::Add, "/watch/b/f.ts", "f.ts");
        foreign.folder_id = "root-b".to_string();
        foreign.folder_path = PathBuf::from("/watch/b");
        harness.watcher.emit(&foreign);
        tokio::time::sleep(Duration::from_millis(600)).await;

        let changes = harness.collected();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].category, ChangeCategory::Added);
        assert_eq!(changes[1].category, ChangeCategory::Deleted);
        categorizer.dispose().await;
    }
}
