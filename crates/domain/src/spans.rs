//! Validated line spans for chunks.

use crate::primitives::PrimitiveError;
use serde::{Deserialize, Serialize};

/// A 1-indexed, inclusive line range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    start_line: u32,
    end_line: u32,
}

impl LineSpan {
    /// Validate and build a line span.
    pub fn new(start_line: u32, end_line: u32) -> Result<Self, PrimitiveError> {
        if start_line == 0 || end_line == 0 {
            return Err(PrimitiveError::LineSpanNonPositive {
                start_line,
                end_line,
            });
        }
        if start_line > end_line {
            return Err(PrimitiveError::LineSpanStartAfterEnd {
                start_line,
                end_line,
            });
        }
        Ok(Self {
            start_line,
            end_line,
        })
    }

    /// Starting line (1-indexed, inclusive).
    #[must_use]
    pub const fn start_line(&self) -> u32 {
        self.start_line
    }

    /// Ending line (1-indexed, inclusive).
    #[must_use]
    pub const fn end_line(&self) -> u32 {
        self.end_line
    }

    /// Number of lines covered by the span.
    #[must_use]
    pub const fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_requires_positive_ordered_lines() {
        assert!(LineSpan::new(0, 5).is_err());
        assert!(LineSpan::new(5, 2).is_err());
    }

    #[test]
    fn span_counts_lines_inclusively() -> Result<(), PrimitiveError> {
        let span = LineSpan::new(3, 7)?;
        assert_eq!(span.line_count(), 5);
        Ok(())
    }
}
