//! Local git client boundary contract.

use crate::BoxFuture;
use codesync_domain::CommitSha;
use codesync_shared::{RequestContext, Result};
use std::path::Path;

/// Boundary contract for local git operations.
pub trait GitPort: Send + Sync {
    /// Clone `url` into `dest` on `branch` (remote default branch when `None`).
    fn clone_repository(
        &self,
        ctx: &RequestContext,
        url: &str,
        branch: Option<&str>,
        dest: &Path,
    ) -> BoxFuture<'_, Result<()>>;

    /// Fast-forward the working tree at `local_path` on `branch`.
    fn pull(
        &self,
        ctx: &RequestContext,
        local_path: &Path,
        branch: &str,
    ) -> BoxFuture<'_, Result<()>>;

    /// Resolve the HEAD commit of the working tree at `local_path`.
    fn head_sha(&self, ctx: &RequestContext, local_path: &Path) -> BoxFuture<'_, Result<CommitSha>>;

    /// Resolve the checked-out branch name at `local_path`.
    fn current_branch(
        &self,
        ctx: &RequestContext,
        local_path: &Path,
    ) -> BoxFuture<'_, Result<String>>;
}
