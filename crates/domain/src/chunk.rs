//! Chunks: the atomic unit of embedding and storage.

use crate::primitives::{PrimitiveError, RepositoryName};
use crate::spans::LineSpan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-file metadata carried by every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFileMetadata {
    /// Lowercased extension without the dot.
    pub extension: String,
    /// File size in bytes at chunking time.
    pub file_size_bytes: u64,
    /// Hex SHA-256 of the whole file content.
    pub content_hash: String,
    /// Filesystem modification time of the file.
    pub file_modified_at: DateTime<Utc>,
}

/// A bounded substring of a source file with provenance metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Deterministic chunk id.
    pub id: String,
    /// Owning repository.
    pub repository: RepositoryName,
    /// Repository-relative file path.
    pub file_path: String,
    /// Zero-based position of this chunk within its file.
    pub chunk_index: u32,
    /// Total chunks produced from the file.
    pub total_chunks: u32,
    /// Line range covered by the chunk.
    pub span: LineSpan,
    /// Chunk text.
    pub content: String,
    /// File-level metadata.
    pub metadata: ChunkFileMetadata,
}

/// Inputs required to derive a deterministic chunk id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkIdInput<'a> {
    /// Owning repository.
    pub repository: &'a RepositoryName,
    /// Repository-relative file path.
    pub file_path: &'a str,
    /// Zero-based chunk position.
    pub chunk_index: u32,
    /// Chunk text.
    pub content: &'a str,
}

/// Hex SHA-256 of arbitrary content.
#[must_use]
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Derive a deterministic chunk identifier.
///
/// The id is a pure function of `(repository, file_path, chunk_index,
/// content hash)` so that re-chunking an unchanged file produces identical
/// ids and delete-then-upsert sequences are idempotent.
pub fn derive_chunk_id(input: &ChunkIdInput<'_>) -> Result<String, PrimitiveError> {
    let mut hasher = Sha256::new();
    hasher.update(input.repository.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(input.file_path.as_bytes());
    hasher.update(b":");
    hasher.update(input.chunk_index.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(hash_content(input.content).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let prefix: String = digest.chars().take(16).collect();
    Ok(format!("chunk_{prefix}"))
}
