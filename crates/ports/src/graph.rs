//! Structural graph store boundary contract (optional collaborator).

use crate::BoxFuture;
use codesync_domain::RepositoryName;
use codesync_shared::{RequestContext, Result};

/// Outcome of ingesting one file into the graph store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphIngestStats {
    /// Nodes created for the file.
    pub nodes_created: u64,
    /// Relationships created for the file.
    pub relationships_created: u64,
    /// Whether the store accepted the file.
    pub success: bool,
}

/// Outcome of deleting one file's graph data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphDeleteStats {
    /// Nodes deleted for the file.
    pub nodes_deleted: u64,
    /// Relationships deleted for the file.
    pub relationships_deleted: u64,
    /// Whether the store accepted the delete.
    pub success: bool,
}

/// Boundary contract for the structural graph store.
///
/// Graph failures are a separate error channel in pipeline results; a graph
/// outage never blocks vector-store synchronization.
pub trait GraphPort: Send + Sync {
    /// Parse `content` and upsert the file's entities and relationships.
    fn ingest_file(
        &self,
        ctx: &RequestContext,
        repository: &RepositoryName,
        path: &str,
        content: &str,
    ) -> BoxFuture<'_, Result<GraphIngestStats>>;

    /// Remove all graph data keyed to the file.
    fn delete_file_data(
        &self,
        ctx: &RequestContext,
        repository: &RepositoryName,
        path: &str,
    ) -> BoxFuture<'_, Result<GraphDeleteStats>>;
}
