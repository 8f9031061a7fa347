//! Persistent repository metadata records.
//!
//! One [`RepositoryRecord`] exists per indexed repository. Records live in a
//! single JSON document on disk (see [`MetadataDocument`]); the camelCase
//! field names are a compatibility surface and must not change.

use crate::primitives::{CollectionName, CommitSha, RepositoryName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current on-disk metadata document version.
pub const METADATA_DOCUMENT_VERSION: &str = "1.0";

/// Lifecycle status of an indexed repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    /// Ingestion in progress.
    Indexing,
    /// Index is current and queryable.
    Ready,
    /// Last operation left errors; see `error_message`.
    Error,
}

/// Outcome of one incremental update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    /// Every change applied cleanly.
    Success,
    /// Some changes applied, some failed.
    Partial,
    /// No change succeeded.
    Failed,
}

/// One entry in a repository's update history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHistoryEntry {
    /// When the update finished.
    pub timestamp: DateTime<Utc>,
    /// Commit the index was at before the update.
    pub previous_commit: String,
    /// Commit the index moved to.
    pub new_commit: String,
    /// Files newly indexed.
    pub files_added: u64,
    /// Files re-indexed (includes renames).
    pub files_modified: u64,
    /// Files whose chunks were removed.
    pub files_deleted: u64,
    /// Chunks written to the vector store.
    pub chunks_upserted: u64,
    /// Chunks removed from the vector store.
    pub chunks_deleted: u64,
    /// Wall-clock duration of the update.
    pub duration_ms: u64,
    /// Number of collected errors.
    pub error_count: u64,
    /// Update outcome.
    pub status: UpdateStatus,
}

/// Durable per-repository record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    /// Repository name (derived from the URL path tail).
    pub name: RepositoryName,
    /// Source URL as given at ingestion time.
    pub url: String,
    /// Tracked branch.
    pub branch: String,
    /// Local working-tree path of the clone.
    pub local_path: String,
    /// Vector collection holding this repository's chunks.
    pub collection_name: CollectionName,
    /// Files successfully indexed.
    pub file_count: u64,
    /// Chunks persisted in the vector collection.
    pub chunk_count: u64,
    /// Completion time of the last full ingestion or update.
    pub last_indexed_at: DateTime<Utc>,
    /// Commit SHA the index corresponds to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed_commit_sha: Option<CommitSha>,
    /// Duration of the initial ingestion.
    pub index_duration_ms: u64,
    /// Lifecycle status.
    pub status: RepositoryStatus,
    /// Summary of the last failure, when status is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Extensions to index (empty means the shared defaults apply).
    #[serde(default)]
    pub include_extensions: Vec<String>,
    /// Glob patterns excluded from indexing.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Number of completed incremental updates.
    #[serde(default)]
    pub incremental_update_count: u64,
    /// Completion time of the last incremental update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_incremental_update_at: Option<DateTime<Utc>>,
    /// Durable lease: true while an update runs (or after a crash).
    #[serde(default)]
    pub update_in_progress: bool,
    /// When the in-flight update began.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_started_at: Option<DateTime<Utc>>,
    /// Bounded update history, newest first.
    #[serde(default)]
    pub update_history: Vec<UpdateHistoryEntry>,
}

impl RepositoryRecord {
    /// Push a history entry at the newest-first position, pruning
    /// oldest-first down to `limit`.
    pub fn push_history(&mut self, entry: UpdateHistoryEntry, limit: usize) {
        self.update_history.insert(0, entry);
        self.update_history.truncate(limit);
    }

    /// Mark the durable update lease as taken.
    pub fn begin_update(&mut self, started_at: DateTime<Utc>) {
        self.update_in_progress = true;
        self.update_started_at = Some(started_at);
    }

    /// Clear the durable update lease.
    pub fn clear_update_lease(&mut self) {
        self.update_in_progress = false;
        self.update_started_at = None;
    }
}

/// Top-level shape of the metadata document on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Document format version.
    pub version: String,
    /// Records keyed by repository name.
    pub repositories: std::collections::BTreeMap<String, RepositoryRecord>,
}

impl MetadataDocument {
    /// Create an empty document at the current version.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: METADATA_DOCUMENT_VERSION.to_string(),
            repositories: std::collections::BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::PrimitiveError;

    fn record(name: &str) -> Result<RepositoryRecord, PrimitiveError> {
        let name = RepositoryName::parse(name)?;
        let collection_name = CollectionName::from(&name);
        Ok(RepositoryRecord {
            name,
            url: "https://github.com/acme/demo".to_string(),
            branch: "main".to_string(),
            local_path: "/var/lib/codesync/clones/demo".to_string(),
            collection_name,
            file_count: 0,
            chunk_count: 0,
            last_indexed_at: Utc::now(),
            last_indexed_commit_sha: None,
            index_duration_ms: 0,
            status: RepositoryStatus::Ready,
            error_message: None,
            include_extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            incremental_update_count: 0,
            last_incremental_update_at: None,
            update_in_progress: false,
            update_started_at: None,
            update_history: Vec::new(),
        })
    }

    fn history_entry(previous: &str, new: &str) -> UpdateHistoryEntry {
        UpdateHistoryEntry {
            timestamp: Utc::now(),
            previous_commit: previous.to_string(),
            new_commit: new.to_string(),
            files_added: 1,
            files_modified: 0,
            files_deleted: 0,
            chunks_upserted: 3,
            chunks_deleted: 0,
            duration_ms: 10,
            error_count: 0,
            status: UpdateStatus::Success,
        }
    }

    #[test]
    fn history_is_bounded_newest_first() -> Result<(), PrimitiveError> {
        let mut record = record("demo")?;
        for n in 0..5 {
            record.push_history(history_entry(&format!("c{n}"), &format!("c{}", n + 1)), 3);
        }
        assert_eq!(record.update_history.len(), 3);
        assert_eq!(record.update_history[0].previous_commit, "c4");
        assert_eq!(record.update_history[2].previous_commit, "c2");
        Ok(())
    }

    #[test]
    fn update_lease_round_trips() -> Result<(), PrimitiveError> {
        let mut record = record("demo")?;
        record.begin_update(Utc::now());
        assert!(record.update_in_progress);
        assert!(record.update_started_at.is_some());
        record.clear_update_lease();
        assert!(!record.update_in_progress);
        assert!(record.update_started_at.is_none());
        Ok(())
    }

    #[test]
    fn record_serializes_camel_case() -> Result<(), Box<dyn std::error::Error>> {
        let record = record("demo")?;
        let value = serde_json::to_value(&record)?;
        assert!(value.get("fileCount").is_some());
        assert!(value.get("updateInProgress").is_some());
        assert!(value.get("lastIndexedAt").is_some());
        assert!(value.get("file_count").is_none());
        Ok(())
    }

    #[test]
    fn empty_document_carries_current_version() {
        let document = MetadataDocument::empty();
        assert_eq!(document.version, METADATA_DOCUMENT_VERSION);
        assert!(document.repositories.is_empty());
    }
}
