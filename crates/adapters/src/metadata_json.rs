//! Repository metadata store backed by one JSON document on disk.
//!
//! Every write rewrites the whole document: serialize to a temp file in the
//! same directory, then rename over the target. A crash mid-write leaves
//! either the old or the new document, never a torn one. A tokio mutex
//! serializes read-modify-write cycles within the process.

use codesync_domain::{METADATA_DOCUMENT_VERSION, MetadataDocument, RepositoryName, RepositoryRecord};
use codesync_ports::{BoxFuture, MetadataStorePort};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// JSON-file metadata store.
pub struct JsonMetadataStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonMetadataStore {
    /// Build a store over the given document path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<MetadataDocument> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MetadataDocument::empty());
            },
            Err(error) => return Err(ErrorEnvelope::from(error)),
        };
        serde_json::from_slice(&raw).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("metadata", "corrupt_document"),
                format!("failed to parse {}: {error}", self.path.display()),
                ErrorClass::NonRetriable,
            )
        })
    }

    async fn save(&self, mut document: MetadataDocument) -> Result<()> {
        document.version = METADATA_DOCUMENT_VERSION.to_string();
        let encoded = serde_json::to_vec_pretty(&document).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("metadata", "encode_failed"),
                format!("failed to encode metadata document: {error}"),
                ErrorClass::NonRetriable,
            )
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ErrorEnvelope::from)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &encoded)
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(ErrorEnvelope::from)?;
        Ok(())
    }
}

impl MetadataStorePort for JsonMetadataStore {
    fn get(
        &self,
        _ctx: &RequestContext,
        name: &RepositoryName,
    ) -> BoxFuture<'_, Result<Option<RepositoryRecord>>> {
        let name = name.as_str().to_owned();
        Box::pin(async move {
            let _guard = self.guard.lock().await;
            let document = self.load().await?;
            Ok(document.repositories.get(&name).cloned())
        })
    }

    fn put(&self, _ctx: &RequestContext, record: RepositoryRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let _guard = self.guard.lock().await;
            let mut document = self.load().await?;
            document
                .repositories
                .insert(record.name.as_str().to_owned(), record);
            self.save(document).await
        })
    }

    fn remove(&self, _ctx: &RequestContext, name: &RepositoryName) -> BoxFuture<'_, Result<bool>> {
        let name = name.as_str().to_owned();
        Box::pin(async move {
            let _guard = self.guard.lock().await;
            let mut document = self.load().await?;
            let removed = document.repositories.remove(&name).is_some();
            if removed {
                self.save(document).await?;
            }
            Ok(removed)
        })
    }

    fn list(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<Vec<RepositoryRecord>>> {
        Box::pin(async move {
            let _guard = self.guard.lock().await;
            let document = self.load().await?;
            Ok(document.repositories.into_values().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_domain::RepositoryStatus;

    fn record(name: &str) -> Result<RepositoryRecord> {
        let name = RepositoryName::parse(name).map_err(ErrorEnvelope::from)?;
        let collection_name = codesync_domain::CollectionName::from(&name);
        Ok(RepositoryRecord {
            url: format!("https://github.com/acme/{name}"),
            branch: "main".to_string(),
            local_path: format!("/clones/{name}"),
            collection_name,
            name,
            file_count: 3,
            chunk_count: 9,
            last_indexed_at: chrono::Utc::now(),
            last_indexed_commit_sha: None,
            index_duration_ms: 100,
            status: RepositoryStatus::Ready,
            error_message: None,
            include_extensions: Vec::new(),
            exclude_patterns: Vec::new(),
            incremental_update_count: 0,
            last_incremental_update_at: None,
            update_in_progress: false,
            update_started_at: None,
            update_history: Vec::new(),
        })
    }

    #[tokio::test]
    async fn round_trips_records_across_instances() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let path = dir.path().join("repositories.json");
        let ctx = RequestContext::new_operation();

        let store = JsonMetadataStore::new(path.clone());
        store.put(&ctx, record("alpha")?).await?;
        store.put(&ctx, record("beta")?).await?;

        // A fresh instance reads the same document (durability).
        let reopened = JsonMetadataStore::new(path.clone());
        let listed = reopened.list(&ctx).await?;
        assert_eq!(listed.len(), 2);
        let alpha = reopened
            .get(&ctx, &RepositoryName::parse("alpha").map_err(ErrorEnvelope::from)?)
            .await?;
        assert!(alpha.is_some_and(|record| record.chunk_count == 9));
        Ok(())
    }

    #[tokio::test]
    async fn document_shape_is_versioned_with_named_records() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let path = dir.path().join("repositories.json");
        let ctx = RequestContext::new_operation();

        let store = JsonMetadataStore::new(path.clone());
        store.put(&ctx, record("alpha")?).await?;

        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(ErrorEnvelope::from)?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    error.to_string(),
                    ErrorClass::NonRetriable,
                )
            })?;
        assert_eq!(
            value.get("version").and_then(serde_json::Value::as_str),
            Some("1.0")
        );
        assert!(value.pointer("/repositories/alpha/fileCount").is_some());
        // No stray temp file left behind.
        assert!(!path.with_extension("json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn missing_document_reads_as_empty() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let store = JsonMetadataStore::new(dir.path().join("absent.json"));
        let ctx = RequestContext::new_operation();
        assert!(store.list(&ctx).await?.is_empty());
        assert!(
            store
                .get(&ctx, &RepositoryName::parse("ghost").map_err(ErrorEnvelope::from)?)
                .await?
                .is_none()
        );
        Ok(())
    }

    #[tokio::test]
    async fn remove_rewrites_the_document() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let path = dir.path().join("repositories.json");
        let ctx = RequestContext::new_operation();
        let store = JsonMetadataStore::new(path);

        store.put(&ctx, record("alpha")?).await?;
        let name = RepositoryName::parse("alpha").map_err(ErrorEnvelope::from)?;
        assert!(store.remove(&ctx, &name).await?);
        assert!(!store.remove(&ctx, &name).await?);
        assert!(store.list(&ctx).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let path = dir.path().join("repositories.json");
        tokio::fs::write(&path, b"{ not json")
            .await
            .map_err(ErrorEnvelope::from)?;

        let store = JsonMetadataStore::new(path);
        let ctx = RequestContext::new_operation();
        let result = store.list(&ctx).await;
        assert!(matches!(result, Err(ref e) if e.code.is("metadata", "corrupt_document")));
        Ok(())
    }
}
