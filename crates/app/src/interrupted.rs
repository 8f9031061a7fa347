//! Interrupted-update detection and remediation.
//!
//! A crash between taking the durable lease and the coordinator's finally
//! step leaves `update_in_progress = true` on disk. At startup the detector
//! reports such records; a caller chooses one of the two remediations. The
//! detector itself never mutates state.

use crate::errors::repository_not_found;
use chrono::{DateTime, Utc};
use codesync_domain::{CommitSha, RepositoryName, RepositoryStatus};
use codesync_ports::MetadataStorePort;
use codesync_shared::{RequestContext, Result};
use std::sync::Arc;

/// Report for one repository whose lease survived a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptedUpdateInfo {
    /// Repository name.
    pub repository_name: RepositoryName,
    /// When the interrupted update began, when recorded.
    pub update_started_at: Option<DateTime<Utc>>,
    /// Milliseconds since `update_started_at`.
    pub elapsed_ms: Option<u64>,
    /// Record status at detection time.
    pub status: RepositoryStatus,
    /// Commit the index claims to be at.
    pub last_known_commit: Option<CommitSha>,
}

/// Scan all records for surviving update leases.
pub async fn detect_interrupted_updates(
    ctx: &RequestContext,
    metadata: &Arc<dyn MetadataStorePort>,
    now: DateTime<Utc>,
) -> Result<Vec<InterruptedUpdateInfo>> {
    let records = metadata.list(ctx).await?;
    Ok(records
        .into_iter()
        .filter(|record| record.update_in_progress)
        .map(|record| {
            let elapsed_ms = record.update_started_at.and_then(|started_at| {
                u64::try_from((now - started_at).num_milliseconds()).ok()
            });
            InterruptedUpdateInfo {
                repository_name: record.name,
                update_started_at: record.update_started_at,
                elapsed_ms,
                status: record.status,
                last_known_commit: record.last_indexed_commit_sha,
            }
        })
        .collect())
}

/// Remediation: reset the lease fields, leaving everything else intact.
pub async fn clear_interrupted_flag(
    ctx: &RequestContext,
    metadata: &Arc<dyn MetadataStorePort>,
    name: &RepositoryName,
) -> Result<()> {
    let mut record = metadata
        .get(ctx, name)
        .await?
        .ok_or_else(|| repository_not_found(name.as_str()))?;
    record.clear_update_lease();
    metadata.put(ctx, record).await
}

/// Remediation: reset the lease and mark the record as needing a forced
/// re-index.
pub async fn mark_as_interrupted(
    ctx: &RequestContext,
    metadata: &Arc<dyn MetadataStorePort>,
    name: &RepositoryName,
) -> Result<()> {
    let mut record = metadata
        .get(ctx, name)
        .await?
        .ok_or_else(|| repository_not_found(name.as_str()))?;
    record.clear_update_lease();
    record.status = RepositoryStatus::Error;
    record.error_message = Some(
        "update interrupted by a crash; run a forced re-index to restore consistency".to_string(),
    );
    metadata.put(ctx, record).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use codesync_shared::ErrorEnvelope;
    use codesync_testkit::{InMemoryMetadataStore, test_record};

    fn store() -> Arc<dyn MetadataStorePort> {
        Arc::new(InMemoryMetadataStore::new())
    }

    #[tokio::test]
    async fn detector_reports_only_in_progress_records() -> Result<()> {
        let typed = Arc::new(InMemoryMetadataStore::new());
        let clean = test_record("clean-repo").map_err(ErrorEnvelope::from)?;
        typed.seed(clean);

        let started_at = Utc::now() - Duration::seconds(90);
        let mut stuck = test_record("stuck-repo").map_err(ErrorEnvelope::from)?;
        stuck.begin_update(started_at);
        typed.seed(stuck);

        let metadata: Arc<dyn MetadataStorePort> = typed;
        let ctx = RequestContext::new_operation();
        let now = Utc::now();
        let reports = detect_interrupted_updates(&ctx, &metadata, now).await?;

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.repository_name.as_str(), "stuck-repo");
        assert!(report.elapsed_ms.is_some_and(|elapsed| elapsed >= 90_000));
        assert_eq!(report.update_started_at, Some(started_at));
        Ok(())
    }

    #[tokio::test]
    async fn clear_flag_preserves_other_fields() -> Result<()> {
        let typed = Arc::new(InMemoryMetadataStore::new());
        let mut record = test_record("stuck-repo").map_err(ErrorEnvelope::from)?;
        record.file_count = 42;
        record.begin_update(Utc::now());
        typed.seed(record.clone());

        let metadata: Arc<dyn MetadataStorePort> = typed.clone();
        let ctx = RequestContext::new_operation();
        clear_interrupted_flag(&ctx, &metadata, &record.name).await?;

        let restored = metadata
            .get(&ctx, &record.name)
            .await?
            .ok_or_else(|| ErrorEnvelope::invariant(codesync_shared::ErrorCode::internal(), "record"))?;
        assert!(!restored.update_in_progress);
        assert!(restored.update_started_at.is_none());
        assert_eq!(restored.file_count, 42);
        assert_eq!(restored.status, RepositoryStatus::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn mark_as_interrupted_requests_a_forced_reindex() -> Result<()> {
        let typed = Arc::new(InMemoryMetadataStore::new());
        let mut record = test_record("stuck-repo").map_err(ErrorEnvelope::from)?;
        record.begin_update(Utc::now());
        typed.seed(record.clone());

        let metadata: Arc<dyn MetadataStorePort> = typed;
        let ctx = RequestContext::new_operation();
        mark_as_interrupted(&ctx, &metadata, &record.name).await?;

        let restored = metadata
            .get(&ctx, &record.name)
            .await?
            .ok_or_else(|| ErrorEnvelope::invariant(codesync_shared::ErrorCode::internal(), "record"))?;
        assert!(!restored.update_in_progress);
        assert_eq!(restored.status, RepositoryStatus::Error);
        assert!(
            restored
                .error_message
                .as_deref()
                .is_some_and(|message| message.contains("re-index"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn remediation_of_unknown_repository_fails() -> Result<()> {
        let metadata = store();
        let ctx = RequestContext::new_operation();
        let name = RepositoryName::parse("ghost-repo").map_err(ErrorEnvelope::from)?;
        let result = clear_interrupted_flag(&ctx, &metadata, &name).await;
        assert!(matches!(result, Err(ref e) if e.code.is("repo", "not_found")));
        Ok(())
    }
}
