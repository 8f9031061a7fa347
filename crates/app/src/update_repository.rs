//! Incremental update coordinator.
//!
//! Compares the indexed commit against the remote head, gates on the
//! change-size threshold, pulls the local clone, drives the incremental
//! update pipeline, and persists counters plus a history entry. The durable
//! `update_in_progress` lease is written before the first remote call and
//! cleared on every terminal branch, success or failure.

use crate::apply_changes::{
    ApplyChangesDeps, ApplyChangesInput, ApplyChangesResult, FileError, UpdatePipelineStats,
    apply_changes,
};
use crate::errors::{
    change_threshold_exceeded, concurrent_update, force_push_detected, git_pull_failed,
    missing_commit_sha, repository_not_found,
};
use chrono::Utc;
use codesync_domain::{
    CommitSha, RepoUrl, RepositoryRecord, RepositoryStatus, UpdateHistoryEntry, UpdateOutcome,
    UpdateStatus,
};
use codesync_ports::{
    BoxFuture, ChunkerPort, CommitInfo, EmbeddingPort, FileSystemPort, ForgePort, GitPort,
    GraphPort, LoggerPort, MetadataStorePort, VectorStorePort, is_forge_not_found,
};
use codesync_shared::{ErrorEnvelope, RequestContext, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Pluggable local-pull step (tests swap the git fast-forward out).
pub type PullFn =
    Arc<dyn Fn(PathBuf, String) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Input payload for the coordinator.
#[derive(Clone)]
pub struct UpdateInput {
    /// Repository to update.
    pub name: codesync_domain::RepositoryName,
    /// Maximum files in one update (inclusive).
    pub change_file_threshold: usize,
    /// Chunk contents per embedding call.
    pub embedding_batch_size: usize,
    /// History ring size.
    pub update_history_limit: usize,
    /// Fallback extensions when the record specifies none. Never empty.
    pub default_include_extensions: Vec<String>,
}

/// Dependencies required by the coordinator.
#[derive(Clone)]
pub struct UpdateDeps {
    /// Metadata store (holds the durable lease).
    pub metadata: Arc<dyn MetadataStorePort>,
    /// Remote forge commit API.
    pub forge: Arc<dyn ForgePort>,
    /// Local git client.
    pub git: Arc<dyn GitPort>,
    /// Clone working-tree reader.
    pub filesystem: Arc<dyn FileSystemPort>,
    /// Chunker.
    pub chunker: Arc<dyn ChunkerPort>,
    /// Embedding provider.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector store.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Optional graph ingestion service.
    pub graph: Option<Arc<dyn GraphPort>>,
    /// Optional structured logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Pull override for tests; defaults to `git.pull`.
    pub pull_override: Option<PullFn>,
}

/// Output of one coordinator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutput {
    /// Outcome of the update.
    pub status: UpdateOutcome,
    /// Remote head commit the index now refers to (unchanged for
    /// `no_changes`).
    pub commit_sha: CommitSha,
    /// Head commit message, when the remote reported one.
    pub commit_message: Option<String>,
    /// Pipeline statistics (all zero for `no_changes`).
    pub stats: UpdatePipelineStats,
    /// Collected pipeline errors.
    pub errors: Vec<FileError>,
    /// Wall-clock duration of the whole coordinator run.
    pub duration_ms: u64,
}

enum Progressed {
    NoChanges {
        head: CommitInfo,
    },
    Applied {
        head: CommitInfo,
        result: ApplyChangesResult,
    },
}

/// Run one coordinator-driven update for `input.name`.
pub async fn update_repository(
    ctx: &RequestContext,
    deps: &UpdateDeps,
    input: UpdateInput,
) -> Result<UpdateOutput> {
    ctx.ensure_not_cancelled("update_repository")?;
    let started = Instant::now();

    // Begin: load, validate, take the durable lease before any remote call.
    let mut record = deps
        .metadata
        .get(ctx, &input.name)
        .await?
        .ok_or_else(|| repository_not_found(input.name.as_str()))?;
    let base = record
        .last_indexed_commit_sha
        .clone()
        .ok_or_else(|| missing_commit_sha(input.name.as_str()))?;
    if record.update_in_progress {
        return Err(concurrent_update(
            input.name.as_str(),
            record.update_started_at,
        ));
    }
    record.begin_update(Utc::now());
    deps.metadata.put(ctx, record.clone()).await?;

    log_event(
        deps,
        ctx,
        "update.start",
        "Incremental update started",
        &record,
        None,
    );

    let progressed = run_update(ctx, deps, &input, &record, &base).await;

    finalize(ctx, deps, &input, progressed, started).await
}

async fn run_update(
    ctx: &RequestContext,
    deps: &UpdateDeps,
    input: &UpdateInput,
    record: &RepositoryRecord,
    base: &CommitSha,
) -> Result<Progressed> {
    // Checking remote.
    let url = RepoUrl::parse(&record.url).map_err(ErrorEnvelope::from)?;
    let head = deps
        .forge
        .head_commit(ctx, url.owner(), url.repo(), &record.branch)
        .await?;
    if head.sha == *base {
        return Ok(Progressed::NoChanges { head });
    }

    // Comparing. A missing base commit means the remote history was rewritten.
    let comparison = deps
        .forge
        .compare_commits(ctx, url.owner(), url.repo(), base, &head.sha)
        .await
        .map_err(|error| {
            if is_forge_not_found(&error) {
                force_push_detected(input.name.as_str(), base.as_str())
            } else {
                error
            }
        })?;

    // Threshold gate: the limit itself is accepted, one more is not.
    if comparison.files.len() > input.change_file_threshold {
        return Err(change_threshold_exceeded(
            input.name.as_str(),
            comparison.files.len(),
            input.change_file_threshold,
        ));
    }

    // Pulling.
    let local_path = PathBuf::from(&record.local_path);
    let pull_result = match deps.pull_override.as_ref() {
        Some(pull) => pull(local_path.clone(), record.branch.clone()).await,
        None => deps.git.pull(ctx, &local_path, &record.branch).await,
    };
    pull_result.map_err(|error| git_pull_failed(input.name.as_str(), &error))?;

    // Applying. Pipeline errors surface in the result, never as Err.
    let include_extensions = if record.include_extensions.is_empty() {
        input.default_include_extensions.clone()
    } else {
        record.include_extensions.clone()
    };
    let pipeline_deps = ApplyChangesDeps {
        filesystem: deps.filesystem.clone(),
        chunker: deps.chunker.clone(),
        embedding: deps.embedding.clone(),
        vector_store: deps.vector_store.clone(),
        graph: deps.graph.clone(),
        logger: deps.logger.clone(),
    };
    let result = apply_changes(
        ctx,
        &pipeline_deps,
        ApplyChangesInput {
            repository: record.name.clone(),
            local_path,
            collection: record.collection_name.clone(),
            include_extensions,
            exclude_patterns: record.exclude_patterns.clone(),
            embedding_batch_size: input.embedding_batch_size,
            changes: comparison.files,
        },
    )
    .await?;

    Ok(Progressed::Applied { head, result })
}

/// The coordinator's finally step: every terminal branch clears the lease.
async fn finalize(
    ctx: &RequestContext,
    deps: &UpdateDeps,
    input: &UpdateInput,
    progressed: Result<Progressed>,
    started: Instant,
) -> Result<UpdateOutput> {
    let mut record = deps
        .metadata
        .get(ctx, &input.name)
        .await?
        .ok_or_else(|| repository_not_found(input.name.as_str()))?;

    match progressed {
        Err(error) => {
            record.clear_update_lease();
            deps.metadata.put(ctx, record.clone()).await?;
            log_event(
                deps,
                ctx,
                "update.failed",
                &format!("Incremental update failed: {}", error.message),
                &record,
                None,
            );
            Err(error)
        },
        Ok(Progressed::NoChanges { head }) => {
            // No history entry for a no-op; the lease still flips back.
            record.clear_update_lease();
            deps.metadata.put(ctx, record.clone()).await?;
            log_event(
                deps,
                ctx,
                "update.no_changes",
                "Remote head matches the indexed commit",
                &record,
                None,
            );
            Ok(UpdateOutput {
                status: UpdateOutcome::NoChanges,
                commit_sha: head.sha,
                commit_message: Some(head.message),
                stats: UpdatePipelineStats::default(),
                errors: Vec::new(),
                duration_ms: elapsed_ms(started),
            })
        },
        Ok(Progressed::Applied { head, result }) => {
            let now = Utc::now();
            let attempted = result.total_files_attempted;
            let error_count = result.errors.len();
            let entry_status = if error_count == 0 {
                UpdateStatus::Success
            } else if error_count < attempted {
                UpdateStatus::Partial
            } else {
                UpdateStatus::Failed
            };

            let previous_commit = record
                .last_indexed_commit_sha
                .as_ref()
                .map(|sha| sha.as_str().to_owned())
                .unwrap_or_default();
            let entry = UpdateHistoryEntry {
                timestamp: now,
                previous_commit,
                new_commit: head.sha.as_str().to_owned(),
                files_added: result.stats.files_added,
                files_modified: result.stats.files_modified,
                files_deleted: result.stats.files_deleted,
                chunks_upserted: result.stats.chunks_upserted,
                chunks_deleted: result.stats.chunks_deleted,
                duration_ms: result.stats.duration_ms,
                error_count: error_count as u64,
                status: entry_status,
            };

            record.file_count = (record.file_count + result.stats.files_added)
                .saturating_sub(result.stats.files_deleted);
            record.chunk_count = (record.chunk_count + result.stats.chunks_upserted)
                .saturating_sub(result.stats.chunks_deleted);
            record.last_indexed_commit_sha = Some(head.sha.clone());
            record.last_indexed_at = now;
            record.last_incremental_update_at = Some(now);
            record.incremental_update_count += 1;
            if error_count == 0 {
                record.status = RepositoryStatus::Ready;
                record.error_message = None;
            } else {
                record.status = RepositoryStatus::Error;
                record.error_message = Some(summarize(&result.errors));
            }
            record.push_history(entry, input.update_history_limit);
            record.clear_update_lease();
            deps.metadata.put(ctx, record.clone()).await?;

            let outcome = if entry_status == UpdateStatus::Failed {
                UpdateOutcome::Failed
            } else {
                UpdateOutcome::Updated
            };
            log_event(
                deps,
                ctx,
                "update.completed",
                "Incremental update finished",
                &record,
                Some(&result.stats),
            );

            Ok(UpdateOutput {
                status: outcome,
                commit_sha: head.sha,
                commit_message: Some(head.message),
                stats: result.stats,
                errors: result.errors,
                duration_ms: elapsed_ms(started),
            })
        },
    }
}

fn summarize(errors: &[FileError]) -> String {
    match errors.first() {
        Some(first) => format!(
            "{} error(s) during incremental update; first: {}: {}",
            errors.len(),
            first.path,
            first.error
        ),
        None => String::new(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn log_event(
    deps: &UpdateDeps,
    ctx: &RequestContext,
    event: &str,
    message: &str,
    record: &RepositoryRecord,
    stats: Option<&UpdatePipelineStats>,
) {
    let Some(logger) = deps.logger.as_ref() else {
        return;
    };
    let mut fields = codesync_ports::LogFields::new();
    fields.insert(
        "correlationId".to_owned().into_boxed_str(),
        Value::String(ctx.correlation_id().as_str().to_owned()),
    );
    fields.insert(
        "repository".to_owned().into_boxed_str(),
        Value::String(record.name.as_str().to_owned()),
    );
    if let Some(stats) = stats {
        fields.insert(
            "filesAdded".to_owned().into_boxed_str(),
            Value::from(stats.files_added),
        );
        fields.insert(
            "filesModified".to_owned().into_boxed_str(),
            Value::from(stats.files_modified),
        );
        fields.insert(
            "filesDeleted".to_owned().into_boxed_str(),
            Value::from(stats.files_deleted),
        );
        fields.insert(
            "chunksUpserted".to_owned().into_boxed_str(),
            Value::from(stats.chunks_upserted),
        );
        fields.insert(
            "chunksDeleted".to_owned().into_boxed_str(),
            Value::from(stats.chunks_deleted),
        );
    }
    logger.info(event, message, Some(fields));
}
