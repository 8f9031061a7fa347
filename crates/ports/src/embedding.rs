//! Embedding provider boundary contract.

use crate::BoxFuture;
use codesync_shared::{RequestContext, Result};

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingProviderInfo {
    /// Stable provider identifier (e.g. `openai`).
    pub id: Box<str>,
    /// Human-readable provider name.
    pub name: Box<str>,
}

/// Boundary contract for embedding generation.
pub trait EmbeddingPort: Send + Sync {
    /// Provider info for this implementation.
    fn provider(&self) -> &EmbeddingProviderInfo;

    /// Embedding vector dimensionality.
    fn dimensions(&self) -> u32;

    /// Embed a batch of texts, one vector per input, in order.
    ///
    /// The pipelines bound batch sizes via configuration
    /// (`embedding_batch_size`, default 100); implementations may reject
    /// larger batches.
    fn embed_batch(
        &self,
        ctx: &RequestContext,
        texts: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;

    /// Probe provider availability.
    fn health_check(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<()>>;
}
