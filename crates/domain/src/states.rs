//! Progress events and operation outcome states.

use serde::{Deserialize, Serialize};

/// Coarse ingestion phase, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPhase {
    /// Cloning the repository.
    Cloning,
    /// Scanning the clone for files to index.
    Scanning,
    /// Chunking, embedding, and storing batches.
    Processing,
    /// Writing the repository record.
    Finalizing,
}

impl IngestPhase {
    /// Canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloning => "cloning",
            Self::Scanning => "scanning",
            Self::Processing => "processing",
            Self::Finalizing => "finalizing",
        }
    }
}

/// Progress event emitted during ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Current phase.
    pub phase: IngestPhase,
    /// Repository the event refers to.
    pub repository: String,
    /// Completion percentage (0-100).
    pub percentage: u8,
    /// Human-readable detail line.
    pub details: String,
    /// When the event was emitted.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Every file indexed cleanly.
    Success,
    /// Some files failed; the rest were indexed.
    Partial,
    /// The pipeline could not complete.
    Failed,
}

/// Outcome of a coordinator-driven update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Remote head equals the indexed commit.
    NoChanges,
    /// Changes were applied (possibly with per-file errors).
    Updated,
    /// No change succeeded.
    Failed,
}

impl UpdateOutcome {
    /// Canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoChanges => "no_changes",
            Self::Updated => "updated",
            Self::Failed => "failed",
        }
    }
}

/// Compute a bounded percentage within a phase's progress band.
#[must_use]
pub fn banded_percentage(band_start: u8, band_end: u8, current: u64, total: u64) -> u8 {
    if total == 0 || band_end <= band_start {
        return band_start;
    }
    let capped = current.min(total);
    let width = u64::from(band_end - band_start);
    let offset = capped.saturating_mul(width) / total;
    band_start.saturating_add(u8::try_from(offset).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banded_percentage_stays_within_band() {
        assert_eq!(banded_percentage(25, 95, 0, 10), 25);
        assert_eq!(banded_percentage(25, 95, 10, 10), 95);
        assert_eq!(banded_percentage(25, 95, 5, 10), 60);
    }

    #[test]
    fn banded_percentage_handles_empty_totals() {
        assert_eq!(banded_percentage(10, 25, 3, 0), 10);
    }

    #[test]
    fn outcome_serializes_snake_case() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(UpdateOutcome::NoChanges)?;
        assert_eq!(value.as_str(), Some("no_changes"));
        Ok(())
    }
}
