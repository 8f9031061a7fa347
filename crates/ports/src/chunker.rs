//! Chunker boundary contract.

use codesync_domain::LineSpan;
use codesync_shared::Result;

/// A chunk of source text with its line span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChunk {
    /// Chunk text.
    pub content: String,
    /// Line range covered by the chunk.
    pub span: LineSpan,
}

/// Boundary contract for splitting file text into chunks.
///
/// Chunking is a pure function of the input text: the same text always
/// yields the same chunks, which keeps derived chunk ids stable.
pub trait ChunkerPort: Send + Sync {
    /// Split UTF-8 text into chunks.
    fn chunk(&self, text: &str) -> Result<Vec<CodeChunk>>;
}
