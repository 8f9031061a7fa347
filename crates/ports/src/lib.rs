//! # codesync-ports
//!
//! Port traits for the codesync hexagonal architecture.
//!
//! This crate defines the interfaces between the application layer and the
//! external collaborators: the forge commit API, the git client, the
//! embedding provider, the vector store, the optional graph store, the
//! chunker, the metadata store, the file watcher, and the structured
//! logger. It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
///
/// We deliberately use boxed futures for boundary traits (I/O-bound work);
/// batch APIs keep allocation overhead off the hot paths.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod chunker;
pub mod embedding;
pub mod forge;
pub mod fs;
pub mod git;
pub mod graph;
pub mod logger;
pub mod metadata;
pub mod vectorstore;
pub mod watcher;

pub use chunker::*;
pub use embedding::*;
pub use forge::*;
pub use fs::*;
pub use git::*;
pub use graph::*;
pub use logger::*;
pub use metadata::*;
pub use vectorstore::*;
pub use watcher::*;

// Re-export selected domain types used in port signatures, so adapter crates
// can implement ports without directly depending on `codesync-domain`.
pub use codesync_domain::{
    CollectionName, CommitSha, FileChange, FileChangeKind, LineSpan, RepositoryName,
    RepositoryRecord,
};

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_domain::domain_crate_version;
    use codesync_shared::shared_crate_version;

    #[test]
    fn ports_crate_compiles() {
        assert!(!ports_crate_version().is_empty());
    }

    #[test]
    fn ports_can_use_domain_and_shared() {
        assert!(!domain_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
