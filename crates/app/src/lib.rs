//! # codesync-app
//!
//! Application use cases for the repository indexing service:
//!
//! - [`ingest`] - one-shot full indexing (clone, scan, chunk, embed, store)
//! - [`apply_changes`] - the incremental update pipeline
//! - [`update_repository`] - the commit-driven update coordinator
//! - [`interrupted`] - crash detection and remediation
//! - [`change_stream`] - rename-correlating change categorizer
//! - [`orchestrator`] - the serialized public API
//!
//! This crate depends on `ports`, `domain`, and `shared` only.

pub mod apply_changes;
pub mod change_stream;
pub mod errors;
pub mod ingest;
pub mod interrupted;
pub mod orchestrator;
pub mod patterns;
pub mod update_repository;

pub use apply_changes::{
    ApplyChangesDeps, ApplyChangesInput, ApplyChangesResult, FileError, GraphStats,
    UpdatePipelineStats, apply_changes,
};
pub use change_stream::{ChangeCategorizer, ChangeCategorizerOptions, ChangeSink};
pub use ingest::{IngestDeps, IngestInput, IngestOutput, ProgressCallback, ingest_repository};
pub use interrupted::{
    InterruptedUpdateInfo, clear_interrupted_flag, detect_interrupted_updates, mark_as_interrupted,
};
pub use orchestrator::{
    IngestRequest, Orchestrator, OrchestratorDeps, OrchestratorSettings, ServiceStatus,
};
pub use update_repository::{
    PullFn, UpdateDeps, UpdateInput, UpdateOutput, update_repository,
};

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
