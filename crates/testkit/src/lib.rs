//! # codesync-testkit
//!
//! In-memory port implementations shared by unit and integration tests.
//! Every fake records enough call history for tests to assert on ordering
//! and counts, and supports scripted failures where pipelines must exercise
//! their error channels.

pub mod in_memory;

pub use in_memory::{
    FakeGit, InMemoryFileSystem, InMemoryGraph, InMemoryMetadataStore, InMemoryVectorStore,
    ManualWatcher, MemoryLogger, StaticEmbedding, StaticForge, StaticStats, WholeFileChunker,
    test_record,
};
