//! Incremental update pipeline: apply a list of file changes to an
//! already-indexed repository.
//!
//! Vector-store work and graph work are independent failure domains: graph
//! errors land in `stats.graph.errors` and never block the vector result.

use crate::patterns::{extension_included, matches_any};
use chrono::Utc;
use codesync_domain::{
    ChunkFileMetadata, ChunkIdInput, ChunkRecord, CollectionName, FileChange, FileChangeKind,
    RepositoryName, derive_chunk_id, hash_content,
};
use codesync_ports::{
    ChunkerPort, EmbeddingPort, FileSystemPort, GraphPort, LoggerPort, VectorDocument,
    VectorStorePort, extension_of,
};
use codesync_shared::{ErrorEnvelope, RequestContext, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Synthetic error path for sub-batch failures.
pub const BATCH_ERROR_PATH: &str = "(batch embedding/storage)";

/// Extensions handed to the graph ingestion service.
pub const STRUCTURAL_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];

/// A collected per-file (or per-batch) error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileError {
    /// Repository-relative path, or [`BATCH_ERROR_PATH`].
    pub path: String,
    /// Human-readable failure description.
    pub error: String,
}

impl FileError {
    fn new(path: impl Into<String>, error: &ErrorEnvelope) -> Self {
        Self {
            path: path.into(),
            error: error.message.clone(),
        }
    }
}

/// Graph side-effect statistics and errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Nodes created across ingested files.
    pub nodes_created: u64,
    /// Nodes deleted across removed files.
    pub nodes_deleted: u64,
    /// Relationships created across ingested files.
    pub relationships_created: u64,
    /// Relationships deleted across removed files.
    pub relationships_deleted: u64,
    /// Files handed to the graph service.
    pub files_processed: u64,
    /// Files skipped (unsupported extension or unreadable).
    pub files_skipped: u64,
    /// Graph-channel errors; never block the vector result.
    pub errors: Vec<FileError>,
}

/// Vector-store statistics for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePipelineStats {
    /// Files newly indexed.
    pub files_added: u64,
    /// Files re-indexed (renames count here).
    pub files_modified: u64,
    /// Files whose chunks were removed.
    pub files_deleted: u64,
    /// Chunks written to the vector store.
    pub chunks_upserted: u64,
    /// Chunks removed from the vector store.
    pub chunks_deleted: u64,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Graph side-effect stats, when a graph service is configured.
    pub graph: Option<GraphStats>,
}

/// Result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyChangesResult {
    /// Accumulated statistics.
    pub stats: UpdatePipelineStats,
    /// Collected per-file and per-batch errors.
    pub errors: Vec<FileError>,
    /// Changes that survived filtering and were attempted.
    pub total_files_attempted: usize,
}

/// Input payload for the pipeline.
#[derive(Clone)]
pub struct ApplyChangesInput {
    /// Owning repository.
    pub repository: RepositoryName,
    /// Clone working-tree root.
    pub local_path: PathBuf,
    /// Target vector collection.
    pub collection: CollectionName,
    /// Resolved include extensions (never empty).
    pub include_extensions: Vec<String>,
    /// Exclude globs.
    pub exclude_patterns: Vec<String>,
    /// Chunk contents per embedding call.
    pub embedding_batch_size: usize,
    /// Changes to apply.
    pub changes: Vec<FileChange>,
}

/// Dependencies required by the pipeline.
#[derive(Clone)]
pub struct ApplyChangesDeps {
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
}

/// Apply a list of file changes to an indexed repository.
///
/// Per-file and per-batch failures are collected into the result; only
/// cancellation propagates as an error.
pub async fn apply_changes(
    ctx: &RequestContext,
    deps: &ApplyChangesDeps,
    input: ApplyChangesInput,
) -> Result<ApplyChangesResult> {
    ctx.ensure_not_cancelled("apply_changes")?;
    let started = Instant::now();

    let surviving = filter_changes(&input);
    if let Some(logger) = deps.logger.as_ref() {
        logger.info(
            "update.pipeline.start",
            "Applying file changes",
            Some(log_fields(&input, surviving.len())),
        );
    }

    let mut result = ApplyChangesResult {
        total_files_attempted: surviving.len(),
        ..ApplyChangesResult::default()
    };
    let mut pending: Vec<ChunkRecord> = Vec::new();
    // File contents kept for graph ingestion after the vector pass.
    let mut contents: std::collections::HashMap<String, String> = std::collections::HashMap::new();

    for change in &surviving {
        ctx.ensure_not_cancelled("apply_changes.dispatch")?;
        dispatch_change(ctx, deps, &input, change, &mut result, &mut pending, &mut contents)
            .await;
    }

    embed_and_store(ctx, deps, &input, pending, &mut result).await;

    if deps.graph.is_some() {
        let graph = graph_side_effects(ctx, deps, &input, &surviving, &contents).await;
        result.stats.graph = Some(graph);
    }

    result.stats.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if let Some(logger) = deps.logger.as_ref() {
        let mut fields = log_fields(&input, surviving.len());
        fields.insert(
            "errors".to_owned().into_boxed_str(),
            Value::from(result.errors.len()),
        );
        fields.insert(
            "chunksUpserted".to_owned().into_boxed_str(),
            Value::from(result.stats.chunks_upserted),
        );
        fields.insert(
            "chunksDeleted".to_owned().into_boxed_str(),
            Value::from(result.stats.chunks_deleted),
        );
        logger.info("update.pipeline.completed", "File changes applied", Some(fields));
    }

    Ok(result)
}

fn filter_changes(input: &ApplyChangesInput) -> Vec<FileChange> {
    input
        .changes
        .iter()
        .filter(|change| {
            // Renames filter on the new path; deletes keep their own path.
            let extension = extension_of(&change.path);
            extension_included(&extension, &input.include_extensions)
                && !matches_any(&change.path, &input.exclude_patterns)
        })
        .cloned()
        .collect()
}

async fn dispatch_change(
    ctx: &RequestContext,
    deps: &ApplyChangesDeps,
    input: &ApplyChangesInput,
    change: &FileChange,
    result: &mut ApplyChangesResult,
    pending: &mut Vec<ChunkRecord>,
    contents: &mut std::collections::HashMap<String, String>,
) {
    match change.kind {
        FileChangeKind::Added => {
            match read_and_chunk(ctx, deps, input, &change.path).await {
                Ok((chunks, content)) => {
                    pending.extend(chunks);
                    contents.insert(change.path.clone(), content);
                    result.stats.files_added += 1;
                },
                Err(error) => result.errors.push(FileError::new(&change.path, &error)),
            }
        },
        FileChangeKind::Modified => {
            if let Err(error) =
                delete_prior_chunks(ctx, deps, input, &change.path, &mut result.stats).await
            {
                result.errors.push(FileError::new(&change.path, &error));
                return;
            }
            match read_and_chunk(ctx, deps, input, &change.path).await {
                Ok((chunks, content)) => {
                    pending.extend(chunks);
                    contents.insert(change.path.clone(), content);
                    result.stats.files_modified += 1;
                },
                Err(error) => result.errors.push(FileError::new(&change.path, &error)),
            }
        },
        FileChangeKind::Deleted => {
            match delete_prior_chunks(ctx, deps, input, &change.path, &mut result.stats).await {
                Ok(()) => result.stats.files_deleted += 1,
                Err(error) => result.errors.push(FileError::new(&change.path, &error)),
            }
        },
        FileChangeKind::Renamed => {
            let Some(previous_path) = change.previous_path.as_deref() else {
                result.errors.push(FileError {
                    path: change.path.clone(),
                    error: "renamed change is missing previousPath".to_string(),
                });
                return;
            };
            if let Err(error) =
                delete_prior_chunks(ctx, deps, input, previous_path, &mut result.stats).await
            {
                result.errors.push(FileError::new(previous_path, &error));
                return;
            }
            match read_and_chunk(ctx, deps, input, &change.path).await {
                Ok((chunks, content)) => {
                    pending.extend(chunks);
                    contents.insert(change.path.clone(), content);
                    // Renames are modifications semantically.
                    result.stats.files_modified += 1;
                },
                Err(error) => result.errors.push(FileError::new(&change.path, &error)),
            }
        },
    }
}

async fn delete_prior_chunks(
    ctx: &RequestContext,
    deps: &ApplyChangesDeps,
    input: &ApplyChangesInput,
    path: &str,
    stats: &mut UpdatePipelineStats,
) -> Result<()> {
    let deleted = deps
        .vector_store
        .delete_documents_by_file_path(ctx, &input.collection, &input.repository, path)
        .await?;
    stats.chunks_deleted += deleted;
    Ok(())
}

async fn read_and_chunk(
    ctx: &RequestContext,
    deps: &ApplyChangesDeps,
    input: &ApplyChangesInput,
    path: &str,
) -> Result<(Vec<ChunkRecord>, String)> {
    let stat = deps
        .filesystem
        .stat_file(ctx, &input.local_path, path)
        .await?
        .ok_or_else(|| {
            ErrorEnvelope::expected(
                codesync_shared::ErrorCode::not_found(),
                format!("file not found in working tree: {path}"),
            )
        })?;
    let content = deps
        .filesystem
        .read_file_text(ctx, &input.local_path, path)
        .await?;
    let chunks = deps.chunker.chunk(&content)?;
    let content_hash = hash_content(&content);
    let total_chunks = u32::try_from(chunks.len()).unwrap_or(u32::MAX);

    let mut records = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.into_iter().enumerate() {
        let chunk_index = u32::try_from(index).unwrap_or(u32::MAX);
        let id = derive_chunk_id(&ChunkIdInput {
            repository: &input.repository,
            file_path: path,
            chunk_index,
            content: &chunk.content,
        })
        .map_err(ErrorEnvelope::from)?;
        records.push(ChunkRecord {
            id,
            repository: input.repository.clone(),
            file_path: path.to_owned(),
            chunk_index,
            total_chunks,
            span: chunk.span,
            content: chunk.content,
            metadata: ChunkFileMetadata {
                extension: extension_of(path),
                file_size_bytes: stat.size_bytes,
                content_hash: content_hash.clone(),
                file_modified_at: stat.modified_at,
            },
        });
    }
    Ok((records, content))
}

async fn embed_and_store(
    ctx: &RequestContext,
    deps: &ApplyChangesDeps,
    input: &ApplyChangesInput,
    pending: Vec<ChunkRecord>,
    result: &mut ApplyChangesResult,
) {
    let batch_size = input.embedding_batch_size.max(1);
    for sub_batch in pending.chunks(batch_size) {
        if ctx.is_cancelled() {
            return;
        }
        let texts: Vec<String> = sub_batch.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = match deps.embedding.embed_batch(ctx, texts).await {
            Ok(embeddings) => embeddings,
            Err(error) => {
                result.errors.push(FileError::new(BATCH_ERROR_PATH, &error));
                continue;
            },
        };
        let indexed_at = Utc::now();
        let documents: Vec<VectorDocument> = sub_batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorDocument::from_chunk(chunk, embedding, indexed_at))
            .collect();
        let stored = documents.len() as u64;
        match deps
            .vector_store
            .upsert_documents(ctx, &input.collection, documents)
            .await
        {
            Ok(()) => result.stats.chunks_upserted += stored,
            Err(error) => result.errors.push(FileError::new(BATCH_ERROR_PATH, &error)),
        }
    }
}

async fn graph_side_effects(
    ctx: &RequestContext,
    deps: &ApplyChangesDeps,
    input: &ApplyChangesInput,
    surviving: &[FileChange],
    contents: &std::collections::HashMap<String, String>,
) -> GraphStats {
    let mut stats = GraphStats::default();
    let Some(graph) = deps.graph.as_ref() else {
        return stats;
    };

    for change in surviving {
        let supported = STRUCTURAL_EXTENSIONS.contains(&extension_of(&change.path).as_str());
        match change.kind {
            FileChangeKind::Deleted => {
                graph_delete(ctx, graph.as_ref(), input, &change.path, &mut stats).await;
            },
            FileChangeKind::Added => {
                if supported {
                    graph_ingest(ctx, graph.as_ref(), input, &change.path, contents, &mut stats)
                        .await;
                } else {
                    stats.files_skipped += 1;
                }
            },
            FileChangeKind::Modified => {
                if supported {
                    graph_delete(ctx, graph.as_ref(), input, &change.path, &mut stats).await;
                    graph_ingest(ctx, graph.as_ref(), input, &change.path, contents, &mut stats)
                        .await;
                } else {
                    stats.files_skipped += 1;
                }
            },
            FileChangeKind::Renamed => {
                if supported {
                    if let Some(previous_path) = change.previous_path.as_deref() {
                        graph_delete(ctx, graph.as_ref(), input, previous_path, &mut stats).await;
                    }
                    graph_ingest(ctx, graph.as_ref(), input, &change.path, contents, &mut stats)
                        .await;
                } else {
                    stats.files_skipped += 1;
                }
            },
        }
    }
    stats
}

async fn graph_delete(
    ctx: &RequestContext,
    graph: &dyn GraphPort,
    input: &ApplyChangesInput,
    path: &str,
    stats: &mut GraphStats,
) {
    match graph.delete_file_data(ctx, &input.repository, path).await {
        Ok(outcome) => {
            stats.nodes_deleted += outcome.nodes_deleted;
            stats.relationships_deleted += outcome.relationships_deleted;
        },
        Err(error) => stats.errors.push(FileError::new(path, &error)),
    }
}

async fn graph_ingest(
    ctx: &RequestContext,
    graph: &dyn GraphPort,
    input: &ApplyChangesInput,
    path: &str,
    contents: &std::collections::HashMap<String, String>,
    stats: &mut GraphStats,
) {
    let Some(content) = contents.get(path) else {
        // The vector pass failed to read this file; nothing to hand over.
        stats.files_skipped += 1;
        return;
    };
    match graph.ingest_file(ctx, &input.repository, path, content).await {
        Ok(outcome) => {
            stats.nodes_created += outcome.nodes_created;
            stats.relationships_created += outcome.relationships_created;
            stats.files_processed += 1;
        },
        Err(error) => stats.errors.push(FileError::new(path, &error)),
    }
}

fn log_fields(input: &ApplyChangesInput, surviving: usize) -> codesync_ports::LogFields {
    let mut fields = codesync_ports::LogFields::new();
    fields.insert(
        "repository".to_owned().into_boxed_str(),
        Value::String(input.repository.as_str().to_owned()),
    );
    fields.insert(
        "changes".to_owned().into_boxed_str(),
        Value::from(input.changes.len()),
    );
    fields.insert(
        "surviving".to_owned().into_boxed_str(),
        Value::from(surviving),
    );
    fields
}
