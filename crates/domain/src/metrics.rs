//! Aggregate update statistics derived from update histories.
//!
//! Pure functions: callers collect history entries from the metadata store
//! and pass them in, together with the clock reading for trend windows.

use crate::record::{UpdateHistoryEntry, UpdateStatus};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Metrics over a bounded trailing time window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendMetrics {
    /// Window width in days.
    pub window_days: i64,
    /// Updates inside the window.
    pub update_count: u64,
    /// Files added + modified + deleted inside the window.
    pub files_processed: u64,
    /// Chunks upserted + deleted inside the window.
    pub chunks_modified: u64,
    /// Mean update duration inside the window.
    pub average_duration_ms: f64,
    /// (partial + failed) / total inside the window.
    pub error_rate: f64,
}

/// Aggregate statistics over the union of repositories' update histories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMetrics {
    /// Total updates recorded.
    pub total_updates: u64,
    /// Mean update duration.
    pub average_duration_ms: f64,
    /// Files added + modified + deleted across all updates.
    pub total_files_processed: u64,
    /// Chunks upserted + deleted across all updates.
    pub total_chunks_modified: u64,
    /// success / total, in [0, 1].
    pub success_rate: f64,
    /// (partial + failed) / total, in [0, 1].
    pub error_rate: f64,
    /// Trailing-window trend.
    pub trend: TrendMetrics,
}

/// Default trend window in days.
pub const DEFAULT_TREND_WINDOW_DAYS: i64 = 7;

/// Aggregate metrics over history entries with the default 7-day trend.
#[must_use]
pub fn aggregate_update_metrics(
    entries: &[UpdateHistoryEntry],
    now: DateTime<Utc>,
) -> UpdateMetrics {
    aggregate_with_window(entries, now, DEFAULT_TREND_WINDOW_DAYS)
}

/// Aggregate metrics with an explicit trend window.
#[must_use]
pub fn aggregate_with_window(
    entries: &[UpdateHistoryEntry],
    now: DateTime<Utc>,
    window_days: i64,
) -> UpdateMetrics {
    let totals = Totals::collect(entries.iter());
    let cutoff = now - Duration::days(window_days);
    let recent = Totals::collect(entries.iter().filter(|entry| entry.timestamp >= cutoff));

    UpdateMetrics {
        total_updates: totals.count,
        average_duration_ms: totals.average_duration_ms(),
        total_files_processed: totals.files,
        total_chunks_modified: totals.chunks,
        success_rate: totals.rate(totals.successes),
        error_rate: totals.rate(totals.count - totals.successes),
        trend: TrendMetrics {
            window_days,
            update_count: recent.count,
            files_processed: recent.files,
            chunks_modified: recent.chunks,
            average_duration_ms: recent.average_duration_ms(),
            error_rate: recent.rate(recent.count - recent.successes),
        },
    }
}

#[derive(Debug, Default)]
struct Totals {
    count: u64,
    successes: u64,
    files: u64,
    chunks: u64,
    duration_ms: u64,
}

impl Totals {
    fn collect<'a>(entries: impl Iterator<Item = &'a UpdateHistoryEntry>) -> Self {
        let mut totals = Self::default();
        for entry in entries {
            totals.count += 1;
            if entry.status == UpdateStatus::Success {
                totals.successes += 1;
            }
            totals.files += entry.files_added + entry.files_modified + entry.files_deleted;
            totals.chunks += entry.chunks_upserted + entry.chunks_deleted;
            totals.duration_ms += entry.duration_ms;
        }
        totals
    }

    #[allow(clippy::cast_precision_loss, reason = "metric display values")]
    fn average_duration_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.duration_ms as f64 / self.count as f64
        }
    }

    #[allow(clippy::cast_precision_loss, reason = "metric display values")]
    fn rate(&self, numerator: u64) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            numerator as f64 / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(
        status: UpdateStatus,
        duration_ms: u64,
        age_days: i64,
        now: DateTime<Utc>,
    ) -> UpdateHistoryEntry {
        UpdateHistoryEntry {
            timestamp: now - Duration::days(age_days),
            previous_commit: "a".repeat(40),
            new_commit: "b".repeat(40),
            files_added: 2,
            files_modified: 1,
            files_deleted: 1,
            chunks_upserted: 10,
            chunks_deleted: 5,
            duration_ms,
            error_count: match status {
                UpdateStatus::Success => 0,
                UpdateStatus::Partial | UpdateStatus::Failed => 1,
            },
            status,
        }
    }

    #[test]
    fn empty_input_yields_all_zero_metrics() {
        let metrics = aggregate_update_metrics(&[], Utc::now());
        assert_eq!(metrics.total_updates, 0);
        assert_eq!(metrics.average_duration_ms, 0.0);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.trend.update_count, 0);
        assert_eq!(metrics.trend.error_rate, 0.0);
    }

    #[test]
    fn rates_and_totals_accumulate() {
        let now = Utc::now();
        let entries = vec![
            entry(UpdateStatus::Success, 100, 0, now),
            entry(UpdateStatus::Partial, 200, 1, now),
            entry(UpdateStatus::Failed, 300, 2, now),
            entry(UpdateStatus::Success, 400, 20, now),
        ];
        let metrics = aggregate_update_metrics(&entries, now);

        assert_eq!(metrics.total_updates, 4);
        assert_eq!(metrics.total_files_processed, 16);
        assert_eq!(metrics.total_chunks_modified, 60);
        assert!((metrics.average_duration_ms - 250.0).abs() < f64::EPSILON);
        assert!((metrics.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((metrics.error_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn trend_window_excludes_old_entries() {
        let now = Utc::now();
        let entries = vec![
            entry(UpdateStatus::Success, 100, 1, now),
            entry(UpdateStatus::Failed, 200, 30, now),
        ];
        let metrics = aggregate_update_metrics(&entries, now);

        assert_eq!(metrics.total_updates, 2);
        assert_eq!(metrics.trend.update_count, 1);
        assert_eq!(metrics.trend.error_rate, 0.0);
        assert!((metrics.trend.average_duration_ms - 100.0).abs() < f64::EPSILON);
    }
}
