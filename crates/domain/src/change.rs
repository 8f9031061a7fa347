//! File change types shared by the forge diff and local-watch paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Semantic kind of a file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    /// The file is new.
    Added,
    /// The file's content changed.
    Modified,
    /// The file was removed.
    Deleted,
    /// The file moved; `previous_path` holds the old location.
    Renamed,
}

impl FileChangeKind {
    /// Canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        }
    }
}

/// One file change to apply to an indexed repository.
///
/// `previous_path` is required iff `kind` is [`FileChangeKind::Renamed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    /// Repository-relative path (the new path for renames).
    pub path: String,
    /// Semantic change kind.
    #[serde(rename = "status")]
    pub kind: FileChangeKind,
    /// Previous repository-relative path, for renames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
}

impl FileChange {
    /// Build an added change.
    pub fn added(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Added,
            previous_path: None,
        }
    }

    /// Build a modified change.
    pub fn modified(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Modified,
            previous_path: None,
        }
    }

    /// Build a deleted change.
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Deleted,
            previous_path: None,
        }
    }

    /// Build a renamed change.
    pub fn renamed(path: impl Into<String>, previous_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileChangeKind::Renamed,
            previous_path: Some(previous_path.into()),
        }
    }
}

/// Snapshot of a watched file's state, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
    /// Path relative to the watched root.
    pub relative_path: String,
    /// Size in bytes at capture time.
    pub size_bytes: u64,
    /// Filesystem modification time.
    pub modified_at: DateTime<Utc>,
    /// Lowercased extension without the dot.
    pub extension: String,
    /// When this snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

/// Category of a detected change from the local watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCategory {
    /// New file appeared.
    Added,
    /// Existing file changed.
    Modified,
    /// File disappeared and no rename matched within the window.
    Deleted,
    /// Unlink and add correlated into a rename.
    Renamed,
}

/// A semantic change detected by the change categorizer.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedChange {
    /// Change category.
    pub category: ChangeCategory,
    /// Absolute path (the new path for renames).
    pub absolute_path: PathBuf,
    /// Path relative to the watched root.
    pub relative_path: String,
    /// Previous relative path, for renames.
    pub previous_relative_path: Option<String>,
    /// Identifier of the watched root that produced the event.
    pub folder_id: String,
    /// Current file state, when it could be captured.
    pub current_state: Option<FileState>,
    /// Previously tracked state, when available.
    pub previous_state: Option<FileState>,
    /// Rename confidence in [0, 1]; only set for renames.
    pub confidence: Option<f64>,
    /// When the change was detected.
    pub detected_at: DateTime<Utc>,
}

impl DetectedChange {
    /// Convert into the [`FileChange`] consumed by the update pipeline.
    #[must_use]
    pub fn to_file_change(&self) -> FileChange {
        match self.category {
            ChangeCategory::Added => FileChange::added(self.relative_path.clone()),
            ChangeCategory::Modified => FileChange::modified(self.relative_path.clone()),
            ChangeCategory::Deleted => FileChange::deleted(self.relative_path.clone()),
            ChangeCategory::Renamed => FileChange {
                path: self.relative_path.clone(),
                kind: FileChangeKind::Renamed,
                previous_path: self.previous_relative_path.clone(),
            },
        }
    }
}
