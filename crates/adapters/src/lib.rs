//! # codesync-adapters
//!
//! Adapter implementations for ports (filesystem, git, forge, embedding,
//! vector store, metadata store, chunker, logging).
//! This crate depends on `ports`, `shared`, `domain`, and `config`.

pub mod chunker_lines;
pub mod embedding_http;
pub mod forge_http;
pub mod fs_local;
pub mod git_cli;
pub mod graph_rest;
pub mod log_sink;
pub mod logger;
pub mod metadata_json;
pub mod vectordb_rest;

pub use chunker_lines::LineChunker;
pub use embedding_http::HttpEmbedding;
pub use forge_http::HttpForge;
pub use fs_local::{LocalFileStat, LocalFileSystem};
pub use git_cli::GitCli;
pub use graph_rest::RestGraphStore;
pub use log_sink::{LogSink, StdoutSink};
pub use logger::JsonLogger;
pub use metadata_json::JsonMetadataStore;
pub use vectordb_rest::RestVectorStore;

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
