//! Repository metadata store boundary contract.

use crate::BoxFuture;
use codesync_domain::{RepositoryName, RepositoryRecord};
use codesync_shared::{RequestContext, Result};

/// Boundary contract for the durable repository metadata store.
///
/// Implementations must make read-modify-write atomic per repository; the
/// coordinator's `update_in_progress` lease provides the single-writer
/// discipline on top.
pub trait MetadataStorePort: Send + Sync {
    /// Load a record by name.
    fn get(
        &self,
        ctx: &RequestContext,
        name: &RepositoryName,
    ) -> BoxFuture<'_, Result<Option<RepositoryRecord>>>;

    /// Insert or replace a record.
    fn put(&self, ctx: &RequestContext, record: RepositoryRecord) -> BoxFuture<'_, Result<()>>;

    /// Delete a record. Returns true when a record existed.
    fn remove(&self, ctx: &RequestContext, name: &RepositoryName) -> BoxFuture<'_, Result<bool>>;

    /// List all records.
    fn list(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<RepositoryRecord>>>;
}
