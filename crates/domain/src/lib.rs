//! # codesync-domain
//!
//! Domain entities, primitives, and value objects for the repository
//! indexing service.
//!
//! - **Primitives** - `RepositoryName`, `CollectionName`, `CommitSha`, `RepoUrl`
//! - **Records** - `RepositoryRecord`, `UpdateHistoryEntry`, the persisted
//!   metadata document
//! - **Changes** - `FileChange`, `FileState`, `DetectedChange`
//! - **Chunks** - `ChunkRecord` with deterministic ids
//! - **States** - progress events and operation outcomes
//! - **Metrics** - pure aggregation over update histories
//!
//! ## Dependency Rules
//!
//! - Depends only on the `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

// Re-export shared types for convenience
pub use codesync_shared::shared_crate_version;

pub mod change;
pub mod chunk;
pub mod metrics;
pub mod primitives;
pub mod record;
pub mod spans;
pub mod states;

pub use change::{ChangeCategory, DetectedChange, FileChange, FileChangeKind, FileState};
pub use chunk::{ChunkFileMetadata, ChunkIdInput, ChunkRecord, derive_chunk_id, hash_content};
pub use metrics::{TrendMetrics, UpdateMetrics, aggregate_update_metrics};
pub use primitives::{
    CollectionName, CommitSha, PrimitiveError, RepoUrl, RepositoryName, sanitize_name,
};
pub use record::{
    METADATA_DOCUMENT_VERSION, MetadataDocument, RepositoryRecord, RepositoryStatus,
    UpdateHistoryEntry, UpdateStatus,
};
pub use spans::LineSpan;
pub use states::{IngestPhase, IngestStatus, ProgressEvent, UpdateOutcome};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
