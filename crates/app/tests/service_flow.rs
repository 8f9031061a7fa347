//! End-to-end service flow over in-memory collaborators: ingest, update,
//! crash recovery, remove.

use chrono::Utc;
use codesync_app::{
    IngestRequest, Orchestrator, OrchestratorDeps, OrchestratorSettings,
    clear_interrupted_flag, detect_interrupted_updates,
};
use codesync_domain::{CommitSha, FileChange, IngestStatus, UpdateOutcome};
use codesync_ports::MetadataStorePort;
use codesync_shared::{ErrorEnvelope, RequestContext, Result};
use codesync_testkit::{
    FakeGit, InMemoryFileSystem, InMemoryMetadataStore, InMemoryVectorStore, StaticEmbedding,
    StaticForge, WholeFileChunker,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FIRST: &str = "1111111111111111111111111111111111111111";
const SECOND: &str = "2222222222222222222222222222222222222222";

struct Service {
    git: Arc<FakeGit>,
    filesystem: Arc<InMemoryFileSystem>,
    vector_store: Arc<InMemoryVectorStore>,
    metadata: Arc<InMemoryMetadataStore>,
    forge: Arc<StaticForge>,
    orchestrator: Orchestrator,
}

fn sha(value: &str) -> Result<CommitSha> {
    CommitSha::parse(value).map_err(ErrorEnvelope::from)
}

fn service() -> Result<Service> {
    let git = Arc::new(FakeGit::new());
    git.set_head_sha(&sha(FIRST)?);
    let filesystem = Arc::new(InMemoryFileSystem::new());
    git.attach_filesystem(filesystem.clone());
    let vector_store = Arc::new(InMemoryVectorStore::new());
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let forge = Arc::new(StaticForge::new());

    let orchestrator = Orchestrator::new(
        OrchestratorDeps {
            git: git.clone(),
            filesystem: filesystem.clone(),
            chunker: Arc::new(WholeFileChunker),
            embedding: Arc::new(StaticEmbedding::new(8)),
            vector_store: vector_store.clone(),
            metadata: metadata.clone(),
            forge: forge.clone(),
            graph: None,
            logger: None,
        },
        OrchestratorSettings {
            forge_host: "github.com".to_string(),
            clones_dir: PathBuf::from("/clones"),
            default_include_extensions: vec!["ts".to_string(), "rs".to_string()],
            file_batch_size: 10,
            embedding_batch_size: 50,
            change_file_threshold: 500,
            update_history_limit: 10,
        },
    );

    Ok(Service {
        git,
        filesystem,
        vector_store,
        metadata,
        forge,
        orchestrator,
    })
}

#[tokio::test]
async fn ingest_update_remove_lifecycle() -> Result<()> {
    let service = service()?;
    let clone_root = Path::new("/clones/widget");
    service.git.stage_file("src/app.ts", "export const a = 1;\n");
    service.git.stage_file("src/old.ts", "export const old = 1;\n");

    // Full ingestion.
    let output = service
        .orchestrator
        .index_repository("https://github.com/acme/widget", IngestRequest::default())
        .await?;
    assert_eq!(output.status, IngestStatus::Success);
    assert_eq!(output.file_count, 2);
    assert_eq!(output.chunk_count, 2);
    assert_eq!(
        service.git.clones().len(),
        1,
        "ingestion clones exactly once"
    );

    // Remote moves ahead: one added, one modified, one deleted.
    service.forge.set_head(&sha(SECOND)?, "feature work");
    service.forge.set_comparison(
        &sha(FIRST)?,
        &sha(SECOND)?,
        vec![
            FileChange::added("src/new.ts"),
            FileChange::modified("src/app.ts"),
            FileChange::deleted("src/old.ts"),
        ],
    );
    service
        .filesystem
        .add_file(clone_root, "src/new.ts", "export const fresh = 2;\n");
    service
        .filesystem
        .add_file(clone_root, "src/app.ts", "export const a = 2;\n");
    service.filesystem.remove_file(clone_root, "src/old.ts");

    let update = service.orchestrator.update_repository("widget").await?;
    assert_eq!(update.status, UpdateOutcome::Updated);
    assert!(update.errors.is_empty());
    assert_eq!(update.stats.files_added, 1);
    assert_eq!(update.stats.files_modified, 1);
    assert_eq!(update.stats.files_deleted, 1);
    assert_eq!(service.git.pulls().len(), 1, "update pulls exactly once");

    // Counter invariant: fileCount' = fileCount + added - deleted.
    let status = service.orchestrator.get_status().await?;
    let record = &status.repositories[0];
    assert_eq!(record.file_count, 2);
    assert_eq!(
        record.chunk_count,
        2 + update.stats.chunks_upserted - update.stats.chunks_deleted
    );
    assert_eq!(
        record.last_indexed_commit_sha.as_ref().map(CommitSha::as_str),
        Some(SECOND)
    );
    assert_eq!(record.update_history.len(), 1);
    assert_eq!(status.metrics.total_updates, 1);

    // A second update with the same head is a no-op.
    let noop = service.orchestrator.update_repository("widget").await?;
    assert_eq!(noop.status, UpdateOutcome::NoChanges);
    let status = service.orchestrator.get_status().await?;
    assert_eq!(
        status.repositories[0].update_history.len(),
        1,
        "no history entry for no_changes"
    );

    // Remove tears down both stores.
    service.orchestrator.remove_repository("widget").await?;
    assert!(!service.vector_store.collection_exists("widget"));
    let status = service.orchestrator.get_status().await?;
    assert!(status.repositories.is_empty());
    Ok(())
}

#[tokio::test]
async fn crashed_update_is_detected_and_recoverable() -> Result<()> {
    let service = service()?;
    service.git.stage_file("src/app.ts", "export const a = 1;\n");

    service
        .orchestrator
        .index_repository("https://github.com/acme/widget", IngestRequest::default())
        .await?;

    // Simulate a crash: lease taken, process gone.
    let ctx = RequestContext::new_operation();
    let name = codesync_domain::RepositoryName::parse("widget").map_err(ErrorEnvelope::from)?;
    let mut record = service
        .metadata
        .get(&ctx, &name)
        .await?
        .ok_or_else(|| {
            ErrorEnvelope::expected(codesync_shared::ErrorCode::not_found(), "record")
        })?;
    record.begin_update(Utc::now());
    service.metadata.seed(record);

    // The coordinator refuses to start while the stale lease is held.
    let refused = service.orchestrator.update_repository("widget").await;
    assert!(matches!(refused, Err(ref e) if e.code.is("repo", "concurrent_update")));

    // Startup detection reports it; the remediation clears it.
    let metadata: Arc<dyn MetadataStorePort> = service.metadata.clone();
    let reports = detect_interrupted_updates(&ctx, &metadata, Utc::now()).await?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].repository_name.as_str(), "widget");

    clear_interrupted_flag(&ctx, &metadata, &name).await?;

    // Updates work again after remediation.
    service.forge.set_head(&sha(FIRST)?, "unchanged");
    let output = service.orchestrator.update_repository("widget").await?;
    assert_eq!(output.status, UpdateOutcome::NoChanges);
    Ok(())
}
