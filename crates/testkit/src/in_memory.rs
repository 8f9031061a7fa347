//! In-memory port implementations.

use chrono::{DateTime, Utc};
use codesync_domain::{
    CollectionName, CommitSha, FileChange, PrimitiveError, RepositoryName, RepositoryRecord,
    RepositoryStatus, sanitize_name,
};
use codesync_domain::LineSpan;
use codesync_ports::{
    BoxFuture, ChunkerPort, CodeChunk, CommitComparison, CommitInfo, EmbeddingPort,
    EmbeddingProviderInfo, FileStatInfo, FileStatPort, FileSystemPort, FileWatcherPort, ForgePort,
    GitPort, GraphDeleteStats, GraphIngestStats, GraphPort, LogEvent, LogFields, LoggerPort,
    MetadataStorePort, RawEventHandler, RawFileEvent, ScannedFile, VectorDocument,
    VectorStorePort, WatchSubscription,
};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a ready repository record for tests.
pub fn test_record(name: &str) -> Result<RepositoryRecord, PrimitiveError> {
    let name = RepositoryName::parse(sanitize_name(name))?;
    let collection_name = CollectionName::from(&name);
    Ok(RepositoryRecord {
        url: format!("https://github.com/acme/{name}"),
        branch: "main".to_string(),
        local_path: format!("/tmp/codesync/clones/{name}"),
        collection_name,
        name,
        file_count: 0,
        chunk_count: 0,
        last_indexed_at: Utc::now(),
        last_indexed_commit_sha: None,
        index_duration_ms: 0,
        status: RepositoryStatus::Ready,
        error_message: None,
        include_extensions: Vec::new(),
        exclude_patterns: Vec::new(),
        incremental_update_count: 0,
        last_incremental_update_at: None,
        update_in_progress: false,
        update_started_at: None,
        update_history: Vec::new(),
    })
}

// =============================================================================
// METADATA STORE
// =============================================================================

/// In-memory metadata store that logs every write.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    state: Mutex<MetadataState>,
}

#[derive(Default)]
struct MetadataState {
    records: BTreeMap<String, RepositoryRecord>,
    put_log: Vec<RepositoryRecord>,
}

impl InMemoryMetadataStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without logging a write.
    pub fn seed(&self, record: RepositoryRecord) {
        let mut state = lock(&self.state);
        state
            .records
            .insert(record.name.as_str().to_owned(), record);
    }

    /// Every record ever passed to `put`, in order.
    #[must_use]
    pub fn put_log(&self) -> Vec<RepositoryRecord> {
        lock(&self.state).put_log.clone()
    }

    /// Number of writes that touched `name`.
    #[must_use]
    pub fn put_count_for(&self, name: &str) -> usize {
        lock(&self.state)
            .put_log
            .iter()
            .filter(|record| record.name.as_str() == name)
            .count()
    }
}

impl MetadataStorePort for InMemoryMetadataStore {
    fn get(
        &self,
        _ctx: &RequestContext,
        name: &RepositoryName,
    ) -> BoxFuture<'_, Result<Option<RepositoryRecord>>> {
        let record = lock(&self.state).records.get(name.as_str()).cloned();
        Box::pin(async move { Ok(record) })
    }

    fn put(&self, _ctx: &RequestContext, record: RepositoryRecord) -> BoxFuture<'_, Result<()>> {
        let mut state = lock(&self.state);
        state.put_log.push(record.clone());
        state
            .records
            .insert(record.name.as_str().to_owned(), record);
        Box::pin(async move { Ok(()) })
    }

    fn remove(&self, _ctx: &RequestContext, name: &RepositoryName) -> BoxFuture<'_, Result<bool>> {
        let removed = lock(&self.state).records.remove(name.as_str()).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn list(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<RepositoryRecord>>> {
        let records = lock(&self.state).records.values().cloned().collect();
        Box::pin(async move { Ok(records) })
    }
}

// =============================================================================
// VECTOR STORE
// =============================================================================

/// In-memory vector store with scripted failures.
#[derive(Default)]
pub struct InMemoryVectorStore {
    state: Mutex<VectorState>,
}

#[derive(Default)]
struct VectorState {
    collections: BTreeMap<String, BTreeMap<String, VectorDocument>>,
    create_failures: usize,
    write_failures: usize,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` collection creations.
    pub fn fail_next_creates(&self, count: usize) {
        lock(&self.state).create_failures = count;
    }

    /// Fail the next `count` add/upsert calls.
    pub fn fail_next_writes(&self, count: usize) {
        lock(&self.state).write_failures = count;
    }

    /// Returns true when the collection exists.
    #[must_use]
    pub fn collection_exists(&self, collection: &str) -> bool {
        lock(&self.state).collections.contains_key(collection)
    }

    /// Documents currently stored in a collection.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<VectorDocument> {
        lock(&self.state)
            .collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn store_write(
    state: &Mutex<VectorState>,
    collection: &CollectionName,
    documents: Vec<VectorDocument>,
) -> Result<()> {
    let mut state = lock(state);
    if state.write_failures > 0 {
        state.write_failures -= 1;
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::new("store", "write_failed"),
            "scripted vector store write failure",
            ErrorClass::Retriable,
        ));
    }
    let docs = state
        .collections
        .entry(collection.as_str().to_owned())
        .or_default();
    for document in documents {
        docs.insert(document.id.clone(), document);
    }
    Ok(())
}

impl VectorStorePort for InMemoryVectorStore {
    fn get_or_create_collection(
        &self,
        _ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let result = {
            let mut state = lock(&self.state);
            if state.create_failures > 0 {
                state.create_failures -= 1;
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::new("store", "create_failed"),
                    "scripted collection creation failure",
                    ErrorClass::Retriable,
                ))
            } else {
                state
                    .collections
                    .entry(collection.as_str().to_owned())
                    .or_default();
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn delete_collection(
        &self,
        _ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        lock(&self.state).collections.remove(collection.as_str());
        Box::pin(async move { Ok(()) })
    }

    fn add_documents(
        &self,
        _ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<()>> {
        let result = store_write(&self.state, collection, documents);
        Box::pin(async move { result })
    }

    fn upsert_documents(
        &self,
        _ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<()>> {
        let result = store_write(&self.state, collection, documents);
        Box::pin(async move { result })
    }

    fn delete_documents_by_file_path(
        &self,
        _ctx: &RequestContext,
        collection: &CollectionName,
        repository: &RepositoryName,
        file_path: &str,
    ) -> BoxFuture<'_, Result<u64>> {
        let mut state = lock(&self.state);
        let deleted = state
            .collections
            .get_mut(collection.as_str())
            .map_or(0, |docs| {
                let before = docs.len();
                docs.retain(|_, document| {
                    document.metadata.repository != repository.as_str()
                        || document.metadata.file_path != file_path
                });
                (before - docs.len()) as u64
            });
        Box::pin(async move { Ok(deleted) })
    }

    fn count_documents(
        &self,
        _ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<u64>> {
        let count = lock(&self.state)
            .collections
            .get(collection.as_str())
            .map_or(0, |docs| docs.len() as u64);
        Box::pin(async move { Ok(count) })
    }
}

// =============================================================================
// EMBEDDING PROVIDER
// =============================================================================

/// Deterministic embedding provider with scripted failures.
pub struct StaticEmbedding {
    provider: EmbeddingProviderInfo,
    dimensions: u32,
    failures: Mutex<usize>,
}

impl Default for StaticEmbedding {
    fn default() -> Self {
        Self::new(8)
    }
}

impl StaticEmbedding {
    /// Create a provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: u32) -> Self {
        Self {
            provider: EmbeddingProviderInfo {
                id: "static".into(),
                name: "Static".into(),
            },
            dimensions,
            failures: Mutex::new(0),
        }
    }

    /// Fail the next `count` batch calls.
    pub fn fail_next_batches(&self, count: usize) {
        *lock(&self.failures) = count;
    }
}

impl EmbeddingPort for StaticEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn dimensions(&self) -> u32 {
        self.dimensions
    }

    fn embed_batch(
        &self,
        _ctx: &RequestContext,
        texts: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let result = {
            let mut failures = lock(&self.failures);
            if *failures > 0 {
                *failures -= 1;
                Err(ErrorEnvelope::unexpected(
                    ErrorCode::new("provider", "unavailable"),
                    "scripted embedding failure",
                    ErrorClass::Retriable,
                ))
            } else {
                let dimensions = self.dimensions as usize;
                Ok(texts
                    .iter()
                    .map(|text| {
                        let seed = (text.len() % 17) as f32 * 0.05;
                        vec![seed; dimensions]
                    })
                    .collect())
            }
        };
        Box::pin(async move { result })
    }

    fn health_check(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }
}

// =============================================================================
// FORGE
// =============================================================================

/// Scripted forge client.
#[derive(Default)]
pub struct StaticForge {
    state: Mutex<ForgeState>,
}

#[derive(Default)]
struct ForgeState {
    head: Option<CommitInfo>,
    comparison: Option<CommitComparison>,
    compare_not_found: bool,
    compare_calls: usize,
}

impl StaticForge {
    /// Create an unscripted forge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the head commit returned by `head_commit`.
    pub fn set_head(&self, sha: &CommitSha, message: &str) {
        lock(&self.state).head = Some(CommitInfo {
            sha: sha.clone(),
            message: message.to_string(),
            author: "Test Author".to_string(),
            date: Utc::now(),
        });
    }

    /// Script the comparison returned by `compare_commits`.
    pub fn set_comparison(&self, base: &CommitSha, head: &CommitSha, files: Vec<FileChange>) {
        lock(&self.state).comparison = Some(CommitComparison {
            base_sha: base.clone(),
            head_sha: head.clone(),
            total_commits: 1,
            files,
        });
    }

    /// Make `compare_commits` fail with `forge:not_found`.
    pub fn set_compare_not_found(&self, not_found: bool) {
        lock(&self.state).compare_not_found = not_found;
    }

    /// Number of `compare_commits` calls observed.
    #[must_use]
    pub fn compare_calls(&self) -> usize {
        lock(&self.state).compare_calls
    }
}

impl ForgePort for StaticForge {
    fn head_commit(
        &self,
        _ctx: &RequestContext,
        _owner: &str,
        _repo: &str,
        _branch: &str,
    ) -> BoxFuture<'_, Result<CommitInfo>> {
        let result = lock(&self.state).head.clone().ok_or_else(|| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("forge", "unscripted"),
                "head commit not scripted",
                ErrorClass::NonRetriable,
            )
        });
        Box::pin(async move { result })
    }

    fn compare_commits(
        &self,
        _ctx: &RequestContext,
        _owner: &str,
        _repo: &str,
        _base: &CommitSha,
        _head: &CommitSha,
    ) -> BoxFuture<'_, Result<CommitComparison>> {
        let result = {
            let mut state = lock(&self.state);
            state.compare_calls += 1;
            if state.compare_not_found {
                Err(ErrorEnvelope::expected(
                    ErrorCode::new("forge", "not_found"),
                    "base commit not found",
                ))
            } else {
                state.comparison.clone().ok_or_else(|| {
                    ErrorEnvelope::unexpected(
                        ErrorCode::new("forge", "unscripted"),
                        "comparison not scripted",
                        ErrorClass::NonRetriable,
                    )
                })
            }
        };
        Box::pin(async move { result })
    }
}

// =============================================================================
// GIT
// =============================================================================

/// Scripted git client recording clone/pull calls.
///
/// When a filesystem is attached, `clone_repository` materializes the
/// staged file tree under the destination, mirroring a real clone.
#[derive(Default)]
pub struct FakeGit {
    state: Mutex<GitState>,
}

#[derive(Default)]
struct GitState {
    clones: Vec<(String, Option<String>, PathBuf)>,
    pulls: Vec<(PathBuf, String)>,
    pull_error: Option<String>,
    head: Option<CommitSha>,
    staged: Vec<(String, String)>,
    filesystem: Option<Arc<InMemoryFileSystem>>,
}

impl FakeGit {
    /// Create an unscripted git client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the filesystem that clones materialize into.
    pub fn attach_filesystem(&self, filesystem: Arc<InMemoryFileSystem>) {
        lock(&self.state).filesystem = Some(filesystem);
    }

    /// Stage a file delivered by the next clones.
    pub fn stage_file(&self, relative_path: &str, content: &str) {
        lock(&self.state)
            .staged
            .push((relative_path.to_owned(), content.to_owned()));
    }

    /// Script the HEAD commit returned after clone/pull.
    pub fn set_head_sha(&self, sha: &CommitSha) {
        lock(&self.state).head = Some(sha.clone());
    }

    /// Make the next pulls fail with the given message.
    pub fn set_pull_error(&self, message: &str) {
        lock(&self.state).pull_error = Some(message.to_string());
    }

    /// Clone calls observed so far.
    #[must_use]
    pub fn clones(&self) -> Vec<(String, Option<String>, PathBuf)> {
        lock(&self.state).clones.clone()
    }

    /// Pull calls observed so far.
    #[must_use]
    pub fn pulls(&self) -> Vec<(PathBuf, String)> {
        lock(&self.state).pulls.clone()
    }
}

impl GitPort for FakeGit {
    fn clone_repository(
        &self,
        _ctx: &RequestContext,
        url: &str,
        branch: Option<&str>,
        dest: &Path,
    ) -> BoxFuture<'_, Result<()>> {
        let mut state = lock(&self.state);
        state.clones.push((
            url.to_owned(),
            branch.map(str::to_owned),
            dest.to_path_buf(),
        ));
        if let Some(filesystem) = state.filesystem.clone() {
            for (relative_path, content) in state.staged.clone() {
                filesystem.add_file(dest, &relative_path, &content);
            }
        }
        Box::pin(async move { Ok(()) })
    }

    fn pull(
        &self,
        _ctx: &RequestContext,
        local_path: &Path,
        branch: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let result = {
            let mut state = lock(&self.state);
            state
                .pulls
                .push((local_path.to_path_buf(), branch.to_owned()));
            match state.pull_error.as_ref() {
                Some(message) => Err(ErrorEnvelope::unexpected(
                    ErrorCode::new("git", "command_failed"),
                    message.clone(),
                    ErrorClass::Retriable,
                )),
                None => Ok(()),
            }
        };
        Box::pin(async move { result })
    }

    fn head_sha(
        &self,
        _ctx: &RequestContext,
        _local_path: &Path,
    ) -> BoxFuture<'_, Result<CommitSha>> {
        let result = lock(&self.state).head.clone().ok_or_else(|| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("git", "unscripted"),
                "head sha not scripted",
                ErrorClass::NonRetriable,
            )
        });
        Box::pin(async move { result })
    }

    fn current_branch(
        &self,
        _ctx: &RequestContext,
        _local_path: &Path,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok("main".to_string()) })
    }
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// In-memory filesystem keyed by absolute path.
#[derive(Default)]
pub struct InMemoryFileSystem {
    state: Mutex<FsState>,
}

#[derive(Default)]
struct FsState {
    files: BTreeMap<PathBuf, FileEntry>,
}

#[derive(Clone)]
struct FileEntry {
    content: String,
    modified_at: DateTime<Utc>,
}

impl InMemoryFileSystem {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file under `root`.
    pub fn add_file(&self, root: &Path, relative_path: &str, content: &str) {
        lock(&self.state).files.insert(
            root.join(relative_path),
            FileEntry {
                content: content.to_owned(),
                modified_at: Utc::now(),
            },
        );
    }

    /// Remove a file under `root`.
    pub fn remove_file(&self, root: &Path, relative_path: &str) {
        lock(&self.state).files.remove(&root.join(relative_path));
    }
}

fn relative_to(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|relative| relative.to_string_lossy().replace('\\', "/"))
}

impl FileSystemPort for InMemoryFileSystem {
    fn list_files(
        &self,
        _ctx: &RequestContext,
        root: &Path,
    ) -> BoxFuture<'_, Result<Vec<ScannedFile>>> {
        let state = lock(&self.state);
        let files = state
            .files
            .iter()
            .filter_map(|(path, entry)| {
                relative_to(root, path).map(|relative_path| ScannedFile {
                    relative_path,
                    size_bytes: entry.content.len() as u64,
                    modified_at: entry.modified_at,
                })
            })
            .collect();
        Box::pin(async move { Ok(files) })
    }

    fn read_file_text(
        &self,
        _ctx: &RequestContext,
        root: &Path,
        relative_path: &str,
    ) -> BoxFuture<'_, Result<String>> {
        let result = lock(&self.state)
            .files
            .get(&root.join(relative_path))
            .map(|entry| entry.content.clone())
            .ok_or_else(|| {
                ErrorEnvelope::expected(
                    ErrorCode::not_found(),
                    format!("no such file: {relative_path}"),
                )
            });
        Box::pin(async move { result })
    }

    fn stat_file(
        &self,
        _ctx: &RequestContext,
        root: &Path,
        relative_path: &str,
    ) -> BoxFuture<'_, Result<Option<ScannedFile>>> {
        let stat = lock(&self.state)
            .files
            .get(&root.join(relative_path))
            .map(|entry| ScannedFile {
                relative_path: relative_path.to_owned(),
                size_bytes: entry.content.len() as u64,
                modified_at: entry.modified_at,
            });
        Box::pin(async move { Ok(stat) })
    }

    fn dir_exists(&self, _ctx: &RequestContext, path: &Path) -> BoxFuture<'_, Result<bool>> {
        let exists = lock(&self.state)
            .files
            .keys()
            .any(|file| file.starts_with(path));
        Box::pin(async move { Ok(exists) })
    }

    fn remove_dir_all(&self, _ctx: &RequestContext, path: &Path) -> BoxFuture<'_, Result<()>> {
        let path = path.to_path_buf();
        lock(&self.state)
            .files
            .retain(|file, _| !file.starts_with(&path));
        Box::pin(async move { Ok(()) })
    }
}

// =============================================================================
// CHUNKER
// =============================================================================

/// Chunker producing one chunk per file (the whole text).
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeFileChunker;

impl ChunkerPort for WholeFileChunker {
    fn chunk(&self, text: &str) -> Result<Vec<CodeChunk>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let lines = text.lines().count().max(1) as u32;
        let span = LineSpan::new(1, lines).map_err(ErrorEnvelope::from)?;
        Ok(vec![CodeChunk {
            content: text.to_owned(),
            span,
        }])
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// In-memory graph store recording ingests and deletes.
#[derive(Default)]
pub struct InMemoryGraph {
    state: Mutex<GraphState>,
}

#[derive(Default)]
struct GraphState {
    ingested: Vec<(String, String)>,
    deleted: Vec<(String, String)>,
    failures: usize,
}

impl InMemoryGraph {
    /// Create an empty graph store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` graph calls.
    pub fn fail_next_calls(&self, count: usize) {
        lock(&self.state).failures = count;
    }

    /// `(repository, path)` pairs ingested so far.
    #[must_use]
    pub fn ingested(&self) -> Vec<(String, String)> {
        lock(&self.state).ingested.clone()
    }

    /// `(repository, path)` pairs deleted so far.
    #[must_use]
    pub fn deleted(&self) -> Vec<(String, String)> {
        lock(&self.state).deleted.clone()
    }
}

fn graph_failure(state: &mut GraphState) -> Option<ErrorEnvelope> {
    if state.failures > 0 {
        state.failures -= 1;
        Some(ErrorEnvelope::unexpected(
            ErrorCode::new("graph", "unavailable"),
            "scripted graph failure",
            ErrorClass::Retriable,
        ))
    } else {
        None
    }
}

impl GraphPort for InMemoryGraph {
    fn ingest_file(
        &self,
        _ctx: &RequestContext,
        repository: &RepositoryName,
        path: &str,
        _content: &str,
    ) -> BoxFuture<'_, Result<GraphIngestStats>> {
        let result = {
            let mut state = lock(&self.state);
            if let Some(error) = graph_failure(&mut state) {
                Err(error)
            } else {
                state
                    .ingested
                    .push((repository.as_str().to_owned(), path.to_owned()));
                Ok(GraphIngestStats {
                    nodes_created: 2,
                    relationships_created: 1,
                    success: true,
                })
            }
        };
        Box::pin(async move { result })
    }

    fn delete_file_data(
        &self,
        _ctx: &RequestContext,
        repository: &RepositoryName,
        path: &str,
    ) -> BoxFuture<'_, Result<GraphDeleteStats>> {
        let result = {
            let mut state = lock(&self.state);
            if let Some(error) = graph_failure(&mut state) {
                Err(error)
            } else {
                state
                    .deleted
                    .push((repository.as_str().to_owned(), path.to_owned()));
                Ok(GraphDeleteStats {
                    nodes_deleted: 2,
                    relationships_deleted: 1,
                    success: true,
                })
            }
        };
        Box::pin(async move { result })
    }
}

// =============================================================================
// LOGGER
// =============================================================================

/// Logger capturing events in memory.
#[derive(Clone, Default)]
pub struct MemoryLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base_fields: LogFields,
}

impl MemoryLogger {
    /// Create an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured events, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<LogEvent> {
        lock(&self.events).clone()
    }
}

impl LoggerPort for MemoryLogger {
    fn log(&self, event: LogEvent) {
        let mut merged = self.base_fields.clone();
        if let Some(extra) = event.fields.clone() {
            merged.extend(extra);
        }
        let event = LogEvent {
            fields: if merged.is_empty() {
                None
            } else {
                Some(merged)
            },
            ..event
        };
        lock(&self.events).push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base_fields = self.base_fields.clone();
        base_fields.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base_fields,
        })
    }
}

// =============================================================================
// WATCHER + STAT
// =============================================================================

/// Watcher driven manually from tests.
#[derive(Default)]
pub struct ManualWatcher {
    handlers: Mutex<HashMap<u64, RawEventHandler>>,
    next_id: AtomicU64,
}

impl ManualWatcher {
    /// Create a watcher with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to every subscriber.
    pub fn emit(&self, event: &RawFileEvent) {
        let handlers: Vec<RawEventHandler> = lock(&self.handlers).values().cloned().collect();
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.handlers).len()
    }
}

impl FileWatcherPort for ManualWatcher {
    fn subscribe(&self, handler: RawEventHandler) -> WatchSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers).insert(id, handler);
        WatchSubscription(id)
    }

    fn unsubscribe(&self, subscription: WatchSubscription) {
        lock(&self.handlers).remove(&subscription.0);
    }
}

/// Scripted stat provider keyed by absolute path.
#[derive(Default)]
pub struct StaticStats {
    stats: Mutex<HashMap<PathBuf, FileStatInfo>>,
}

impl StaticStats {
    /// Create an empty stat table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a stat result for a path.
    pub fn set(&self, path: &Path, size_bytes: u64) {
        lock(&self.stats).insert(
            path.to_path_buf(),
            FileStatInfo {
                size_bytes,
                modified_at: Utc::now(),
            },
        );
    }

    /// Remove a scripted stat (the path will report as missing).
    pub fn unset(&self, path: &Path) {
        lock(&self.stats).remove(path);
    }
}

impl FileStatPort for StaticStats {
    fn stat(
        &self,
        _ctx: &RequestContext,
        absolute_path: &Path,
    ) -> BoxFuture<'_, Result<Option<FileStatInfo>>> {
        let stat = lock(&self.stats).get(absolute_path).copied();
        Box::pin(async move { Ok(stat) })
    }
}
