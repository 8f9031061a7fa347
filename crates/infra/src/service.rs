//! Service assembly: configuration to a running orchestrator.

use chrono::Utc;
use codesync_adapters::{
    GitCli, HttpEmbedding, HttpForge, JsonLogger, LineChunker, LocalFileSystem,
    RestGraphStore, RestVectorStore, StdoutSink,
};
use codesync_app::{
    InterruptedUpdateInfo, Orchestrator, OrchestratorDeps, OrchestratorSettings,
    detect_interrupted_updates,
};
use codesync_config::ServiceConfig;
use codesync_ports::{GraphPort, LoggerPort, MetadataStorePort};
use codesync_shared::{RequestContext, Result};
use serde_json::Value;
use std::sync::Arc;

/// An assembled indexing service.
pub struct Service {
    /// Public API surface.
    pub orchestrator: Arc<Orchestrator>,
    /// Metadata store handle for startup recovery tooling.
    pub metadata: Arc<dyn MetadataStorePort>,
    /// Structured logger shared with the CLI.
    pub logger: Arc<dyn LoggerPort>,
}

/// Build a service from validated configuration.
pub fn build_service(config: &ServiceConfig) -> Result<Service> {
    let logger: Arc<dyn LoggerPort> = Arc::new(
        JsonLogger::new(Arc::new(StdoutSink::new()))
            .with_min_level(JsonLogger::level_from_str(&config.logging.level)),
    );
    let metadata: Arc<dyn MetadataStorePort> = Arc::new(
        codesync_adapters::JsonMetadataStore::new(config.storage.metadata_path()),
    );
    let graph: Option<Arc<dyn GraphPort>> = RestGraphStore::from_config(&config.graph)?
        .map(|adapter| Arc::new(adapter) as Arc<dyn GraphPort>);

    let deps = OrchestratorDeps {
        git: Arc::new(GitCli::new()),
        filesystem: Arc::new(LocalFileSystem::new()),
        chunker: Arc::new(LineChunker::default()),
        embedding: Arc::new(HttpEmbedding::new(&config.embedding)?),
        vector_store: Arc::new(RestVectorStore::new(&config.vector_store)?),
        metadata: metadata.clone(),
        forge: Arc::new(HttpForge::new(&config.forge)?),
        graph,
        logger: Some(logger.clone()),
    };
    let settings = OrchestratorSettings {
        forge_host: config.forge.host.clone(),
        clones_dir: config.storage.clones_dir(),
        default_include_extensions: config.effective_include_extensions(&[]),
        file_batch_size: config.indexing.file_batch_size,
        embedding_batch_size: config.indexing.embedding_batch_size,
        change_file_threshold: config.indexing.change_file_threshold,
        update_history_limit: config.indexing.update_history_limit,
    };

    Ok(Service {
        orchestrator: Arc::new(Orchestrator::new(deps, settings)),
        metadata,
        logger,
    })
}

/// Startup recovery report: log every repository whose update lease
/// survived a crash and return the reports for the caller to act on.
pub async fn report_interrupted_updates(service: &Service) -> Result<Vec<InterruptedUpdateInfo>> {
    let ctx = RequestContext::new_operation();
    let reports = detect_interrupted_updates(&ctx, &service.metadata, Utc::now()).await?;
    for report in &reports {
        let mut fields = codesync_ports::LogFields::new();
        fields.insert(
            "repository".into(),
            Value::String(report.repository_name.as_str().to_owned()),
        );
        if let Some(elapsed_ms) = report.elapsed_ms {
            fields.insert("elapsedMs".into(), Value::from(elapsed_ms));
        }
        service.logger.warn(
            "startup.interrupted_update",
            "repository has an update lease left over from a crash",
            Some(fields),
        );
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_a_service_from_default_config() -> Result<()> {
        let dir = tempfile::tempdir().map_err(codesync_shared::ErrorEnvelope::from)?;
        let mut config = ServiceConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();

        let service = build_service(&config)?;
        let status = service.orchestrator.get_status().await?;
        assert!(status.repositories.is_empty());
        assert!(report_interrupted_updates(&service).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn graph_misconfiguration_fails_fast() {
        let mut config = ServiceConfig::default();
        config.graph.enabled = true;
        config.graph.base_url = None;
        assert!(build_service(&config).is_err());
    }
}
