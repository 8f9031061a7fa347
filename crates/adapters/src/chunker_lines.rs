//! Line-window chunker.
//!
//! Splits file text into fixed-size line windows with overlap. Pure: the
//! same input always yields the same chunks, which keeps derived chunk ids
//! stable across runs.

use codesync_domain::LineSpan;
use codesync_ports::{ChunkerPort, CodeChunk};
use codesync_shared::{ErrorCode, ErrorEnvelope, Result};

const DEFAULT_CHUNK_LINES: usize = 150;
const DEFAULT_OVERLAP_LINES: usize = 20;
// Oversized single lines (minified bundles) are truncated rather than
// ballooning embedding payloads.
const MAX_CHUNK_CHARS: usize = 8_000;

/// Fixed-window line chunker.
#[derive(Debug, Clone, Copy)]
pub struct LineChunker {
    chunk_lines: usize,
    overlap_lines: usize,
}

impl Default for LineChunker {
    fn default() -> Self {
        Self {
            chunk_lines: DEFAULT_CHUNK_LINES,
            overlap_lines: DEFAULT_OVERLAP_LINES,
        }
    }
}

impl LineChunker {
    /// Build a chunker with explicit window sizing.
    pub fn new(chunk_lines: usize, overlap_lines: usize) -> Result<Self> {
        if chunk_lines == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk size must be greater than zero",
            ));
        }
        if overlap_lines >= chunk_lines {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "chunk overlap must be smaller than the chunk size",
            ));
        }
        Ok(Self {
            chunk_lines,
            overlap_lines,
        })
    }
}

impl ChunkerPort for LineChunker {
    fn chunk(&self, text: &str) -> Result<Vec<CodeChunk>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();
        let step = self.chunk_lines - self.overlap_lines;
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < total {
            let end = (start + self.chunk_lines).min(total);
            let window = &lines[start..end];
            let mut content = window.join("\n");
            if content.len() > MAX_CHUNK_CHARS {
                content.truncate(floor_char_boundary(&content, MAX_CHUNK_CHARS));
            }
            if !content.trim().is_empty() {
                let span = LineSpan::new(
                    u32::try_from(start + 1).unwrap_or(u32::MAX),
                    u32::try_from(end).unwrap_or(u32::MAX),
                )
                .map_err(ErrorEnvelope::from)?;
                chunks.push(CodeChunk { content, span });
            }
            if end == total {
                break;
            }
            start += step;
        }

        Ok(chunks)
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
