//! Ingestion pipeline: build the index for a repository from scratch.
//!
//! Pre-flight failures (invalid URL, already indexed) are returned as
//! errors; every failure past pre-flight collapses into a `failed` output
//! so callers always get stats and a collected error list.

use crate::apply_changes::{BATCH_ERROR_PATH, FileError};
use crate::errors::already_exists;
use crate::patterns::{extension_included, matches_any};
use chrono::Utc;
use codesync_domain::{
    ChunkFileMetadata, ChunkIdInput, ChunkRecord, CollectionName, CommitSha, IngestPhase,
    IngestStatus, ProgressEvent, RepoUrl, RepositoryName, RepositoryRecord, RepositoryStatus,
    derive_chunk_id, hash_content,
};
use codesync_ports::{
    ChunkerPort, EmbeddingPort, FileSystemPort, GitPort, LoggerPort, MetadataStorePort,
    ScannedFile, VectorDocument, VectorStorePort,
};
use codesync_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Callback invoked with progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Input payload for ingestion.
#[derive(Clone)]
pub struct IngestInput {
    /// Remote repository URL.
    pub url: String,
    /// Branch to track (remote default when `None`).
    pub branch: Option<String>,
    /// Per-repository include extensions (may be empty).
    pub include_extensions: Vec<String>,
    /// Per-repository exclude globs.
    pub exclude_patterns: Vec<String>,
    /// Rebuild an existing index.
    pub force: bool,
    /// Forge host accepted for URLs.
    pub forge_host: String,
    /// Directory receiving clones.
    pub clones_dir: PathBuf,
    /// Service-wide default extensions, used when the per-repository list
    /// is empty. Never empty.
    pub default_include_extensions: Vec<String>,
    /// Files per processing batch.
    pub file_batch_size: usize,
    /// Chunk contents per embedding call.
    pub embedding_batch_size: usize,
    /// Optional progress callback.
    pub on_progress: Option<ProgressCallback>,
}

/// Dependencies required by ingestion.
#[derive(Clone)]
pub struct IngestDeps {
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
    /// Optional structured logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Output of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutput {
    /// Derived repository name.
    pub repository: RepositoryName,
    /// Run outcome.
    pub status: IngestStatus,
    /// Files successfully chunked.
    pub file_count: u64,
    /// Chunks stored in the vector collection.
    pub chunk_count: u64,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// HEAD commit of the clone, when resolvable.
    pub commit_sha: Option<CommitSha>,
    /// Collected per-file and per-batch errors.
    pub errors: Vec<FileError>,
}

/// Ingest a repository from scratch (or rebuild with `force`).
pub async fn ingest_repository(
    ctx: &RequestContext,
    deps: &IngestDeps,
    input: IngestInput,
) -> Result<IngestOutput> {
    ctx.ensure_not_cancelled("ingest_repository")?;
    let started = Instant::now();

    // Pre-flight: URL shape, forge host, name derivation, existence check.
    let url = RepoUrl::parse(&input.url).map_err(ErrorEnvelope::from)?;
    if !url.host().eq_ignore_ascii_case(&input.forge_host) {
        return Err(ErrorEnvelope::expected(
            ErrorCode::new("repo", "invalid_url"),
            format!(
                "unsupported forge host {} (expected {})",
                url.host(),
                input.forge_host
            ),
        ));
    }
    let name = RepositoryName::from_url(&url).map_err(ErrorEnvelope::from)?;
    let collection = CollectionName::from(&name);

    if deps.metadata.get(ctx, &name).await?.is_some() && !input.force {
        return Err(already_exists(name.as_str()));
    }

    if let Some(logger) = deps.logger.as_ref() {
        let mut fields = codesync_ports::LogFields::new();
        fields.insert(
            "repository".to_owned().into_boxed_str(),
            Value::String(name.as_str().to_owned()),
        );
        fields.insert(
            "url".to_owned().into_boxed_str(),
            Value::String(url.as_str().to_owned()),
        );
        fields.insert("force".to_owned().into_boxed_str(), Value::from(input.force));
        logger.info("ingest.start", "Ingestion started", Some(fields));
    }

    match run_ingest(ctx, deps, &input, &url, &name, &collection, started).await {
        Ok(output) => Ok(output),
        Err(error) => {
            // Pipeline failures collapse into a failed result.
            if let Some(logger) = deps.logger.as_ref() {
                let mut fields = codesync_ports::LogFields::new();
                fields.insert(
                    "repository".to_owned().into_boxed_str(),
                    Value::String(name.as_str().to_owned()),
                );
                fields.insert(
                    "error".to_owned().into_boxed_str(),
                    Value::String(error.to_string()),
                );
                logger.error("ingest.failed", "Ingestion failed", Some(fields));
            }
            Ok(IngestOutput {
                repository: name,
                status: IngestStatus::Failed,
                file_count: 0,
                chunk_count: 0,
                duration_ms: elapsed_ms(started),
                commit_sha: None,
                errors: vec![FileError {
                    path: "(pipeline)".to_string(),
                    error: error.message,
                }],
            })
        },
    }
}

#[allow(clippy::too_many_arguments, reason = "internal pipeline driver")]
async fn run_ingest(
    ctx: &RequestContext,
    deps: &IngestDeps,
    input: &IngestInput,
    url: &RepoUrl,
    name: &RepositoryName,
    collection: &CollectionName,
    started: Instant,
) -> Result<IngestOutput> {
    let progress = Progress::new(name, input.on_progress.clone());

    // Phase 1: clone.
    progress.emit(IngestPhase::Cloning, 0, "Cloning repository");
    let dest = input.clones_dir.join(name.as_str());
    deps.filesystem.remove_dir_all(ctx, &dest).await?;
    deps.git
        .clone_repository(ctx, url.as_str(), input.branch.as_deref(), &dest)
        .await?;
    let branch = match input.branch.clone() {
        Some(branch) => branch,
        None => deps.git.current_branch(ctx, &dest).await?,
    };
    progress.emit(IngestPhase::Cloning, 10, "Clone complete");

    // Phase 2: scan.
    let include = effective_extensions(input);
    let all_files = deps.filesystem.list_files(ctx, &dest).await?;
    let mut files: Vec<ScannedFile> = Vec::new();
    for file in all_files {
        if extension_included(&file.extension(), &include)
            && !matches_any(&file.relative_path, &input.exclude_patterns)
        {
            files.push(file);
            if files.len() % 200 == 0 {
                progress.emit(
                    IngestPhase::Scanning,
                    18,
                    &format!("Scanned {} files", files.len()),
                );
            }
        }
    }
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    progress.emit(
        IngestPhase::Scanning,
        25,
        &format!("Found {} files to index", files.len()),
    );

    // Phase 3: collection preparation. Failure here is fatal.
    if input.force {
        deps.vector_store.delete_collection(ctx, collection).await?;
    }
    deps.vector_store
        .get_or_create_collection(ctx, collection)
        .await?;

    // Phase 4: batched chunk -> embed -> store.
    let mut errors: Vec<FileError> = Vec::new();
    let mut file_count = 0u64;
    let mut chunk_count = 0u64;
    let batch_size = input.file_batch_size.max(1);
    let batch_total = files.len().div_ceil(batch_size).max(1);

    for (batch_index, batch) in files.chunks(batch_size).enumerate() {
        ctx.ensure_not_cancelled("ingest.batch")?;

        let mut batch_chunks: Vec<ChunkRecord> = Vec::new();
        for file in batch {
            match chunk_file(ctx, deps, name, &dest, file).await {
                Ok(chunks) => {
                    batch_chunks.extend(chunks);
                    file_count += 1;
                },
                Err(error) => errors.push(FileError {
                    path: file.relative_path.clone(),
                    error: error.message,
                }),
            }
        }

        chunk_count += store_batch(ctx, deps, input, collection, batch_chunks, &mut errors).await;

        let percentage = codesync_domain::states::banded_percentage(
            25,
            95,
            (batch_index + 1) as u64,
            batch_total as u64,
        );
        progress.emit_at(
            IngestPhase::Processing,
            percentage,
            &format!("Processed batch {}/{batch_total}", batch_index + 1),
        );
    }

    // Phase 5: metadata finalization.
    progress.emit(IngestPhase::Finalizing, 95, "Writing repository metadata");
    let commit_sha = match deps.git.head_sha(ctx, &dest).await {
        Ok(sha) => Some(sha),
        Err(error) => {
            if let Some(logger) = deps.logger.as_ref() {
                logger.warn(
                    "ingest.head_unresolved",
                    &format!("could not resolve clone HEAD: {}", error.message),
                    None,
                );
            }
            None
        },
    };

    let duration_ms = elapsed_ms(started);
    let status = if errors.is_empty() {
        RepositoryStatus::Ready
    } else {
        RepositoryStatus::Error
    };
    let record = RepositoryRecord {
        name: name.clone(),
        url: url.as_str().to_owned(),
        branch,
        local_path: dest.to_string_lossy().into_owned(),
        collection_name: collection.clone(),
        file_count,
        chunk_count,
        last_indexed_at: Utc::now(),
        last_indexed_commit_sha: commit_sha.clone(),
        index_duration_ms: duration_ms,
        status,
        error_message: summarize_errors(&errors),
        include_extensions: input.include_extensions.clone(),
        exclude_patterns: input.exclude_patterns.clone(),
        incremental_update_count: 0,
        last_incremental_update_at: None,
        update_in_progress: false,
        update_started_at: None,
        update_history: Vec::new(),
    };
    deps.metadata.put(ctx, record).await?;
    progress.emit(IngestPhase::Finalizing, 100, "Ingestion complete");

    if let Some(logger) = deps.logger.as_ref() {
        let mut fields = codesync_ports::LogFields::new();
        fields.insert(
            "repository".to_owned().into_boxed_str(),
            Value::String(name.as_str().to_owned()),
        );
        fields.insert("files".to_owned().into_boxed_str(), Value::from(file_count));
        fields.insert("chunks".to_owned().into_boxed_str(), Value::from(chunk_count));
        fields.insert(
            "durationMs".to_owned().into_boxed_str(),
            Value::from(duration_ms),
        );
        fields.insert(
            "errors".to_owned().into_boxed_str(),
            Value::from(errors.len()),
        );
        logger.info("ingest.completed", "Ingestion completed", Some(fields));
    }

    Ok(IngestOutput {
        repository: name.clone(),
        status: if errors.is_empty() {
            IngestStatus::Success
        } else {
            IngestStatus::Partial
        },
        file_count,
        chunk_count,
        duration_ms,
        commit_sha,
        errors,
    })
}

async fn chunk_file(
    ctx: &RequestContext,
    deps: &IngestDeps,
    name: &RepositoryName,
    dest: &std::path::Path,
    file: &ScannedFile,
) -> Result<Vec<ChunkRecord>> {
    let content = deps
        .filesystem
        .read_file_text(ctx, dest, &file.relative_path)
        .await?;
    let chunks = deps.chunker.chunk(&content)?;
    let content_hash = hash_content(&content);
    let total_chunks = u32::try_from(chunks.len()).unwrap_or(u32::MAX);

    let mut records = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.into_iter().enumerate() {
        let chunk_index = u32::try_from(index).unwrap_or(u32::MAX);
        let id = derive_chunk_id(&ChunkIdInput {
            repository: name,
            file_path: &file.relative_path,
            chunk_index,
            content: &chunk.content,
        })
        .map_err(ErrorEnvelope::from)?;
        records.push(ChunkRecord {
            id,
            repository: name.clone(),
            file_path: file.relative_path.clone(),
            chunk_index,
            total_chunks,
            span: chunk.span,
            content: chunk.content,
            metadata: ChunkFileMetadata {
                extension: file.extension(),
                file_size_bytes: file.size_bytes,
                content_hash: content_hash.clone(),
                file_modified_at: file.modified_at,
            },
        });
    }
    Ok(records)
}

/// Embed and store one file batch. An embedding or storage failure records
/// a batch-level error and abandons the rest of this batch; other batches
/// continue.
async fn store_batch(
    ctx: &RequestContext,
    deps: &IngestDeps,
    input: &IngestInput,
    collection: &CollectionName,
    batch_chunks: Vec<ChunkRecord>,
    errors: &mut Vec<FileError>,
) -> u64 {
    let mut stored = 0u64;
    for sub_batch in batch_chunks.chunks(input.embedding_batch_size.max(1)) {
        let texts: Vec<String> = sub_batch.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = match deps.embedding.embed_batch(ctx, texts).await {
            Ok(embeddings) => embeddings,
            Err(error) => {
                errors.push(FileError {
                    path: BATCH_ERROR_PATH.to_string(),
                    error: error.message,
                });
                return stored;
            },
        };
        let indexed_at = Utc::now();
        let documents: Vec<VectorDocument> = sub_batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorDocument::from_chunk(chunk, embedding, indexed_at))
            .collect();
        let count = documents.len() as u64;
        match deps
            .vector_store
            .add_documents(ctx, collection, documents)
            .await
        {
            Ok(()) => stored += count,
            Err(error) => {
                errors.push(FileError {
                    path: BATCH_ERROR_PATH.to_string(),
                    error: error.message,
                });
                return stored;
            },
        }
    }
    stored
}

fn effective_extensions(input: &IngestInput) -> Vec<String> {
    if input.include_extensions.is_empty() {
        input.default_include_extensions.clone()
    } else {
        input.include_extensions.clone()
    }
}

fn summarize_errors(errors: &[FileError]) -> Option<String> {
    let first = errors.first()?;
    Some(format!(
        "{} error(s) during indexing; first: {}: {}",
        errors.len(),
        first.path,
        first.error
    ))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

struct Progress {
    repository: String,
    callback: Option<ProgressCallback>,
}

impl Progress {
    fn new(name: &RepositoryName, callback: Option<ProgressCallback>) -> Self {
        Self {
            repository: name.as_str().to_owned(),
            callback,
        }
    }

    fn emit(&self, phase: IngestPhase, percentage: u8, details: &str) {
        self.emit_at(phase, percentage, details);
    }

    fn emit_at(&self, phase: IngestPhase, percentage: u8, details: &str) {
        if let Some(callback) = self.callback.as_ref() {
            callback(ProgressEvent {
                phase,
                repository: self.repository.clone(),
                percentage,
                details: details.to_owned(),
                timestamp: Utc::now(),
            });
        }
    }
}
