//! Forge commit API boundary contract.

use crate::BoxFuture;
use chrono::{DateTime, Utc};
use codesync_domain::{CommitSha, FileChange};
use codesync_shared::{ErrorEnvelope, RequestContext, Result};

/// The head commit of a branch on the remote forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full commit SHA.
    pub sha: CommitSha,
    /// Commit message subject.
    pub message: String,
    /// Author display name.
    pub author: String,
    /// Author date.
    pub date: DateTime<Utc>,
}

/// Result of comparing two commits on the remote forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitComparison {
    /// Base commit of the comparison.
    pub base_sha: CommitSha,
    /// Head commit of the comparison.
    pub head_sha: CommitSha,
    /// Number of commits between base and head.
    pub total_commits: u64,
    /// Files changed between base and head.
    pub files: Vec<FileChange>,
}

/// Error code raised when a compared commit is unknown to the forge.
///
/// The coordinator interprets this as a force-push: the base commit no
/// longer exists in the remote history.
#[must_use]
pub fn is_forge_not_found(error: &ErrorEnvelope) -> bool {
    error.code.is("forge", "not_found")
}

/// Boundary contract for the remote forge commit API.
pub trait ForgePort: Send + Sync {
    /// Fetch the head commit of `branch`.
    fn head_commit(
        &self,
        ctx: &RequestContext,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> BoxFuture<'_, Result<CommitInfo>>;

    /// Compare `base...head` and list the changed files.
    ///
    /// Implementations must surface an error with code `forge:not_found`
    /// when either commit is unknown to the remote.
    fn compare_commits(
        &self,
        ctx: &RequestContext,
        owner: &str,
        repo: &str,
        base: &CommitSha,
        head: &CommitSha,
    ) -> BoxFuture<'_, Result<CommitComparison>>;
}
