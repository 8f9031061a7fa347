//! Vector store boundary contract.

use crate::BoxFuture;
use chrono::{DateTime, Utc};
use codesync_domain::{ChunkRecord, CollectionName, RepositoryName};
use codesync_shared::{RequestContext, Result};
use serde::{Deserialize, Serialize};

/// Per-document metadata written to the vector store.
///
/// The field names are a compatibility surface shared with search-side
/// consumers; they serialize exactly as declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Repository-relative file path.
    pub file_path: String,
    /// Owning repository name.
    pub repository: String,
    /// Zero-based chunk position within the file.
    pub chunk_index: u32,
    /// Total chunks produced from the file.
    pub total_chunks: u32,
    /// First line covered by the chunk (1-indexed).
    pub chunk_start_line: u32,
    /// Last line covered by the chunk (1-indexed).
    pub chunk_end_line: u32,
    /// Lowercased extension without the dot.
    pub file_extension: String,
    /// File size in bytes at chunking time.
    pub file_size_bytes: u64,
    /// Hex SHA-256 of the whole file content.
    pub content_hash: String,
    /// When the chunk was indexed.
    pub indexed_at: DateTime<Utc>,
    /// Filesystem modification time of the file.
    pub file_modified_at: DateTime<Utc>,
}

/// A document stored in a vector collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    /// Stable document id (the chunk id).
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// Dense embedding vector.
    pub embedding: Vec<f32>,
    /// Document metadata.
    pub metadata: DocumentMetadata,
}

impl VectorDocument {
    /// Build a document from a chunk and its embedding.
    #[must_use]
    pub fn from_chunk(chunk: &ChunkRecord, embedding: Vec<f32>, indexed_at: DateTime<Utc>) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            embedding,
            metadata: DocumentMetadata {
                file_path: chunk.file_path.clone(),
                repository: chunk.repository.as_str().to_owned(),
                chunk_index: chunk.chunk_index,
                total_chunks: chunk.total_chunks,
                chunk_start_line: chunk.span.start_line(),
                chunk_end_line: chunk.span.end_line(),
                file_extension: chunk.metadata.extension.clone(),
                file_size_bytes: chunk.metadata.file_size_bytes,
                content_hash: chunk.metadata.content_hash.clone(),
                indexed_at,
                file_modified_at: chunk.metadata.file_modified_at,
            },
        }
    }
}

/// Boundary contract for vector storage.
pub trait VectorStorePort: Send + Sync {
    /// Create the collection if absent; succeed when it already exists.
    fn get_or_create_collection(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Drop a collection. Succeeds when the collection is absent.
    fn delete_collection(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Insert documents (ingestion path).
    fn add_documents(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Insert-or-replace documents by id (incremental update path).
    fn upsert_documents(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        documents: Vec<VectorDocument>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete all documents whose `file_path` metadata equals `file_path`
    /// for the given repository. Returns the number of chunks deleted.
    fn delete_documents_by_file_path(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        repository: &RepositoryName,
        file_path: &str,
    ) -> BoxFuture<'_, Result<u64>>;

    /// Count documents in a collection.
    fn count_documents(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
    ) -> BoxFuture<'_, Result<u64>>;
}
