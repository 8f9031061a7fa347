//! Orchestrator: the serialized public API of the indexing service.
//!
//! At most one ingestion runs service-wide; the in-memory slot is checked
//! and taken under one lock and released by a drop guard on every exit
//! path. Per-repository update exclusivity is the coordinator's durable
//! lease. Progress listeners are fanned out per event.

use crate::apply_changes::FileError;
use crate::errors::{indexing_in_progress, repository_not_found};
use crate::ingest::{IngestDeps, IngestInput, IngestOutput, ProgressCallback, ingest_repository};
use crate::update_repository::{UpdateDeps, UpdateInput, UpdateOutput, update_repository};
use chrono::Utc;
use codesync_domain::{
    ProgressEvent, RepoUrl, RepositoryName, RepositoryRecord, UpdateHistoryEntry, UpdateMetrics,
    aggregate_update_metrics,
};
use codesync_ports::{
    ChunkerPort, EmbeddingPort, FileSystemPort, ForgePort, GitPort, GraphPort, LoggerPort,
    MetadataStorePort, VectorStorePort,
};
use codesync_shared::{CorrelationId, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Service-level knobs resolved from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Forge host accepted for repository URLs.
    pub forge_host: String,
    /// Directory receiving clones.
    pub clones_dir: PathBuf,
    /// Fallback include extensions. Never empty.
    pub default_include_extensions: Vec<String>,
    /// Files per ingestion batch.
    pub file_batch_size: usize,
    /// Chunk contents per embedding call.
    pub embedding_batch_size: usize,
    /// Maximum files in one incremental update.
    pub change_file_threshold: usize,
    /// History ring size.
    pub update_history_limit: usize,
}

/// Port bundle for the orchestrator.
#[derive(Clone)]
pub struct OrchestratorDeps {
    /// Git client.
    pub git: Arc<dyn GitPort>,
    /// Clone working-tree reader.
    pub filesystem: Arc<dyn FileSystemPort>,
    /// Chunker.
    pub chunker: Arc<dyn ChunkerPort>,
    /// Embedding provider.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector store.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStorePort>,
    /// Remote forge commit API.
    pub forge: Arc<dyn ForgePort>,
    /// Optional graph ingestion service.
    pub graph: Option<Arc<dyn GraphPort>>,
    /// Optional structured logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Per-request ingestion options.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Branch to track (remote default when `None`).
    pub branch: Option<String>,
    /// Per-repository include extensions.
    pub include_extensions: Vec<String>,
    /// Per-repository exclude globs.
    pub exclude_patterns: Vec<String>,
    /// Rebuild an existing index.
    pub force: bool,
}

/// Snapshot returned by [`Orchestrator::get_status`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    /// All repository records.
    pub repositories: Vec<RepositoryRecord>,
    /// Aggregate update metrics across repositories.
    pub metrics: UpdateMetrics,
    /// Repository currently being ingested, if any.
    pub ingesting: Option<String>,
}

#[derive(Default)]
struct SharedState {
    ingesting: Option<String>,
}

struct IngestSlot {
    state: Arc<Mutex<SharedState>>,
}

impl Drop for IngestSlot {
    fn drop(&mut self) {
        lock(&self.state).ingesting = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type ListenerEntry = (u64, ProgressCallback);

/// The indexing service's public API.
pub struct Orchestrator {
    deps: OrchestratorDeps,
    settings: OrchestratorSettings,
    state: Arc<Mutex<SharedState>>,
    listeners: Arc<Mutex<Vec<ListenerEntry>>>,
    next_listener_id: AtomicU64,
}

impl Orchestrator {
    /// Build an orchestrator over the given ports and settings.
    #[must_use]
    pub fn new(deps: OrchestratorDeps, settings: OrchestratorSettings) -> Self {
        Self {
            deps,
            settings,
            state: Arc::new(Mutex::new(SharedState::default())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Register a progress listener; returns a handle for removal.
    pub fn add_progress_listener(&self, listener: ProgressCallback) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Remove a progress listener by handle.
    pub fn remove_progress_listener(&self, id: u64) {
        lock(&self.listeners).retain(|(listener_id, _)| *listener_id != id);
    }

    /// Index a repository from scratch.
    ///
    /// Throws pre-flight errors (InvalidUrl, AlreadyExists,
    /// IndexingInProgress); pipeline failures come back as a `failed`
    /// output.
    pub async fn index_repository(
        &self,
        url: &str,
        request: IngestRequest,
    ) -> Result<IngestOutput> {
        let parsed = RepoUrl::parse(url).map_err(ErrorEnvelope::from)?;
        let name = RepositoryName::from_url(&parsed).map_err(ErrorEnvelope::from)?;
        let _slot = self.acquire_ingest_slot(name.as_str())?;

        let ctx = RequestContext::new_operation();
        let input = IngestInput {
            url: url.to_string(),
            branch: request.branch,
            include_extensions: request.include_extensions,
            exclude_patterns: request.exclude_patterns,
            force: request.force,
            forge_host: self.settings.forge_host.clone(),
            clones_dir: self.settings.clones_dir.clone(),
            default_include_extensions: self.settings.default_include_extensions.clone(),
            file_batch_size: self.settings.file_batch_size,
            embedding_batch_size: self.settings.embedding_batch_size,
            on_progress: Some(self.fan_out_callback()),
        };
        let deps = IngestDeps {
            git: self.deps.git.clone(),
            filesystem: self.deps.filesystem.clone(),
            chunker: self.deps.chunker.clone(),
            embedding: self.deps.embedding.clone(),
            vector_store: self.deps.vector_store.clone(),
            metadata: self.deps.metadata.clone(),
            logger: self.deps.logger.clone(),
        };
        ingest_repository(&ctx, &deps, input).await
    }

    /// Re-index a repository (index with `force = true`).
    pub async fn reindex_repository(
        &self,
        url: &str,
        mut request: IngestRequest,
    ) -> Result<IngestOutput> {
        request.force = true;
        self.index_repository(url, request).await
    }

    /// Run one coordinator-driven incremental update.
    pub async fn update_repository(&self, name: &str) -> Result<UpdateOutput> {
        let name = RepositoryName::parse(name).map_err(ErrorEnvelope::from)?;
        let ctx = RequestContext::new(CorrelationId::new_update_id());
        let deps = UpdateDeps {
            metadata: self.deps.metadata.clone(),
            forge: self.deps.forge.clone(),
            git: self.deps.git.clone(),
            filesystem: self.deps.filesystem.clone(),
            chunker: self.deps.chunker.clone(),
            embedding: self.deps.embedding.clone(),
            vector_store: self.deps.vector_store.clone(),
            graph: self.deps.graph.clone(),
            logger: self.deps.logger.clone(),
            pull_override: None,
        };
        let input = UpdateInput {
            name,
            change_file_threshold: self.settings.change_file_threshold,
            embedding_batch_size: self.settings.embedding_batch_size,
            update_history_limit: self.settings.update_history_limit,
            default_include_extensions: self.settings.default_include_extensions.clone(),
        };
        update_repository(&ctx, &deps, input).await
    }

    /// Remove a repository: drop its vector collection, then its record.
    pub async fn remove_repository(&self, name: &str) -> Result<()> {
        let name = RepositoryName::parse(name).map_err(ErrorEnvelope::from)?;
        {
            let state = lock(&self.state);
            if state.ingesting.as_deref() == Some(name.as_str()) {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::conflict(),
                    format!("repository {name} is currently being indexed"),
                ));
            }
        }

        let ctx = RequestContext::new_operation();
        let record = self
            .deps
            .metadata
            .get(&ctx, &name)
            .await?
            .ok_or_else(|| repository_not_found(name.as_str()))?;
        self.deps
            .vector_store
            .delete_collection(&ctx, &record.collection_name)
            .await?;
        self.deps.metadata.remove(&ctx, &name).await?;

        if let Some(logger) = self.deps.logger.as_ref() {
            logger.info(
                "repository.removed",
                &format!("repository {name} removed"),
                None,
            );
        }
        Ok(())
    }

    /// Snapshot records and aggregate metrics.
    pub async fn get_status(&self) -> Result<ServiceStatus> {
        let ctx = RequestContext::new_operation();
        let repositories = self.deps.metadata.list(&ctx).await?;
        let entries: Vec<UpdateHistoryEntry> = repositories
            .iter()
            .flat_map(|record| record.update_history.iter().cloned())
            .collect();
        let metrics = aggregate_update_metrics(&entries, Utc::now());
        let ingesting = lock(&self.state).ingesting.clone();
        Ok(ServiceStatus {
            repositories,
            metrics,
            ingesting,
        })
    }

    fn acquire_ingest_slot(&self, name: &str) -> Result<IngestSlot> {
        let mut state = lock(&self.state);
        if let Some(current) = state.ingesting.as_deref() {
            return Err(indexing_in_progress(current));
        }
        state.ingesting = Some(name.to_string());
        Ok(IngestSlot {
            state: Arc::clone(&self.state),
        })
    }

    /// One callback fanning each event out to every registered listener.
    fn fan_out_callback(&self) -> ProgressCallback {
        let listeners = Arc::clone(&self.listeners);
        Arc::new(move |event: ProgressEvent| {
            let snapshot: Vec<ProgressCallback> = lock(&listeners)
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect();
            for listener in snapshot {
                listener(event.clone());
            }
        })
    }
}

/// Convenience: pipeline errors of a failed output, joined for operators.
#[must_use]
pub fn summarize_output_errors(errors: &[FileError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.path, error.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_domain::IngestStatus;
    use codesync_ports::{BoxFuture, EmbeddingProviderInfo};
    use codesync_testkit::{
        FakeGit, InMemoryFileSystem, InMemoryMetadataStore, InMemoryVectorStore, StaticEmbedding,
        StaticForge, WholeFileChunker, test_record,
    };
    use tokio::sync::Notify;

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            forge_host: "github.com".to_string(),
            clones_dir: PathBuf::from("/clones"),
            default_include_extensions: vec!["ts".to_string(), "rs".to_string()],
            file_batch_size: 50,
            embedding_batch_size: 100,
            change_file_threshold: 500,
            update_history_limit: 10,
        }
    }

    struct Harness {
        git: Arc<FakeGit>,
        filesystem: Arc<InMemoryFileSystem>,
        vector_store: Arc<InMemoryVectorStore>,
        metadata: Arc<InMemoryMetadataStore>,
        forge: Arc<StaticForge>,
    }

    impl Harness {
        fn new() -> Result<Self> {
            let git = Arc::new(FakeGit::new());
            let sha = codesync_domain::CommitSha::parse(
                "1234567890abcdef1234567890abcdef12345678",
            )
            .map_err(ErrorEnvelope::from)?;
            git.set_head_sha(&sha);
            let filesystem = Arc::new(InMemoryFileSystem::new());
            git.attach_filesystem(filesystem.clone());
            Ok(Self {
                git,
                filesystem,
                vector_store: Arc::new(InMemoryVectorStore::new()),
                metadata: Arc::new(InMemoryMetadataStore::new()),
                forge: Arc::new(StaticForge::new()),
            })
        }

        fn orchestrator_with_embedding(
            &self,
            embedding: Arc<dyn EmbeddingPort>,
        ) -> Orchestrator {
            Orchestrator::new(
                OrchestratorDeps {
                    git: self.git.clone(),
                    filesystem: self.filesystem.clone(),
                    chunker: Arc::new(WholeFileChunker),
                    embedding,
                    vector_store: self.vector_store.clone(),
                    metadata: self.metadata.clone(),
                    forge: self.forge.clone(),
                    graph: None,
                    logger: None,
                },
                settings(),
            )
        }

        fn orchestrator(&self) -> Orchestrator {
            self.orchestrator_with_embedding(Arc::new(StaticEmbedding::new(4)))
        }
    }

    /// Embedding provider that blocks until released (for concurrency tests).
    struct GatedEmbedding {
        provider: EmbeddingProviderInfo,
        gate: Arc<Notify>,
        entered: Arc<Notify>,
    }

    impl GatedEmbedding {
        fn new() -> (Arc<Self>, Arc<Notify>, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let entered = Arc::new(Notify::new());
            let provider = Arc::new(Self {
                provider: EmbeddingProviderInfo {
                    id: "gated".into(),
                    name: "Gated".into(),
                },
                gate: gate.clone(),
                entered: entered.clone(),
            });
            (provider, gate, entered)
        }
    }

    impl EmbeddingPort for GatedEmbedding {
        fn provider(&self) -> &EmbeddingProviderInfo {
            &self.provider
        }

        fn dimensions(&self) -> u32 {
            4
        }

        fn embed_batch(
            &self,
            _ctx: &RequestContext,
            texts: Vec<String>,
        ) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
            let gate = self.gate.clone();
            let entered = self.entered.clone();
            Box::pin(async move {
                entered.notify_one();
                gate.notified().await;
                Ok(vec![vec![0.0; 4]; texts.len()])
            })
        }

        fn health_check(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    #[tokio::test]
    async fn ingestion_is_exclusive_and_blocks_remove_of_same_name() -> Result<()> {
        let harness = Harness::new()?;
        harness.git.stage_file("src/app.ts", "let a = 1;\n");

        let (embedding, gate, entered) = GatedEmbedding::new();
        let orchestrator = Arc::new(harness.orchestrator_with_embedding(embedding));

        let background = orchestrator.clone();
        let running = tokio::spawn(async move {
            background
                .index_repository("https://github.com/acme/widget", IngestRequest::default())
                .await
        });
        entered.notified().await;

        // Second ingestion is refused while the first is in flight.
        let refused = orchestrator
            .index_repository("https://github.com/acme/other", IngestRequest::default())
            .await;
        assert!(matches!(refused, Err(ref e) if e.code.is("repo", "indexing_in_progress")));

        // Removing the repository being ingested is refused too.
        let refused = orchestrator.remove_repository("widget").await;
        assert!(matches!(refused, Err(ref e) if e.code.is("core", "conflict")));

        gate.notify_one();
        let output = running
            .await
            .map_err(|_| ErrorEnvelope::invariant(ErrorCode::internal(), "join failed"))??;
        assert_eq!(output.status, IngestStatus::Success);

        // Slot released: a fresh ingestion may start.
        let status = orchestrator.get_status().await?;
        assert!(status.ingesting.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn remove_deletes_collection_and_record() -> Result<()> {
        let harness = Harness::new()?;
        let record = test_record("widget").map_err(ErrorEnvelope::from)?;
        harness.metadata.seed(record.clone());
        let ctx = RequestContext::new_operation();
        harness
            .vector_store
            .get_or_create_collection(&ctx, &record.collection_name)
            .await?;

        let orchestrator = harness.orchestrator();
        orchestrator.remove_repository("widget").await?;

        assert!(!harness.vector_store.collection_exists("widget"));
        assert!(harness.metadata.get(&ctx, &record.name).await?.is_none());

        let result = orchestrator.remove_repository("widget").await;
        assert!(matches!(result, Err(ref e) if e.code.is("repo", "not_found")));
        Ok(())
    }

    #[tokio::test]
    async fn status_reports_records_and_metrics() -> Result<()> {
        let harness = Harness::new()?;
        let mut record = test_record("widget").map_err(ErrorEnvelope::from)?;
        record.push_history(
            UpdateHistoryEntry {
                timestamp: Utc::now(),
                previous_commit: "a".repeat(40),
                new_commit: "b".repeat(40),
                files_added: 1,
                files_modified: 0,
                files_deleted: 0,
                chunks_upserted: 5,
                chunks_deleted: 0,
                duration_ms: 100,
                error_count: 0,
                status: codesync_domain::UpdateStatus::Success,
            },
            10,
        );
        harness.metadata.seed(record);

        let status = harness.orchestrator().get_status().await?;
        assert_eq!(status.repositories.len(), 1);
        assert_eq!(status.metrics.total_updates, 1);
        assert!((status.metrics.success_rate - 1.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn progress_listeners_receive_events_until_removed() -> Result<()> {
        let harness = Harness::new()?;
        harness.git.stage_file("src/app.ts", "let a = 1;\n");
        let orchestrator = harness.orchestrator();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = orchestrator.add_progress_listener(Arc::new(move |event| {
            lock(&sink).push(event.percentage);
        }));

        orchestrator
            .index_repository("https://github.com/acme/widget", IngestRequest::default())
            .await?;
        let first_run = lock(&seen).len();
        assert!(first_run > 0);

        orchestrator.remove_progress_listener(id);
        orchestrator
            .reindex_repository("https://github.com/acme/widget", IngestRequest::default())
            .await?;
        assert_eq!(lock(&seen).len(), first_run);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_url_is_thrown_before_taking_the_slot() -> Result<()> {
        let harness = Harness::new()?;
        let orchestrator = harness.orchestrator();
        let result = orchestrator
            .index_repository("not-a-url", IngestRequest::default())
            .await;
        assert!(matches!(result, Err(ref e) if e.code.is("repo", "invalid_url")));
        let status = orchestrator.get_status().await?;
        assert!(status.ingesting.is_none());
        Ok(())
    }
}
