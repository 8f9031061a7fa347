//! Pre-flight and operational error constructors.
//!
//! The orchestrator's public entry points surface exactly these errors;
//! everything else is collected into result objects. Codes live under the
//! `repo` namespace and are stable.

use chrono::{DateTime, Utc};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// A repository with this name is already indexed (and `force` was not set).
pub fn already_exists(name: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("repo", "already_exists"),
        format!("repository {name} is already indexed; pass force to re-index"),
    )
    .with_metadata("repository", name)
}

/// Another ingestion is running somewhere in the service.
pub fn indexing_in_progress(current: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_class(
        ErrorCode::new("repo", "indexing_in_progress"),
        format!("an ingestion is already running for {current}; retry later"),
        ErrorClass::Retriable,
    )
    .with_metadata("repository", current)
}

/// No record exists for the repository name.
pub fn repository_not_found(name: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("repo", "not_found"),
        format!("repository {name} is not indexed"),
    )
    .with_metadata("repository", name)
}

/// The record has no `last_indexed_commit_sha` to update from.
pub fn missing_commit_sha(name: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("repo", "missing_commit_sha"),
        format!("repository {name} has no indexed commit; run a full index first"),
    )
    .with_metadata("repository", name)
}

/// The record's durable lease is already taken.
pub fn concurrent_update(name: &str, started_at: Option<DateTime<Utc>>) -> ErrorEnvelope {
    let mut envelope = ErrorEnvelope::expected(
        ErrorCode::new("repo", "concurrent_update"),
        format!("an update for {name} is already in progress"),
    )
    .with_metadata("repository", name);
    if let Some(started_at) = started_at {
        envelope = envelope.with_metadata("updateStartedAt", started_at.to_rfc3339());
    }
    envelope
}

/// The comparison returned more files than the configured threshold.
pub fn change_threshold_exceeded(name: &str, files: usize, threshold: usize) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("repo", "change_threshold_exceeded"),
        format!(
            "update for {name} touches {files} files, above the threshold of {threshold}; run a full re-index"
        ),
    )
    .with_metadata("repository", name)
    .with_metadata("files", files.to_string())
    .with_metadata("threshold", threshold.to_string())
}

/// The indexed base commit no longer exists in the remote history.
pub fn force_push_detected(name: &str, base: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("repo", "force_push_detected"),
        format!(
            "commit {base} of {name} is unknown to the remote (force push); run a full re-index"
        ),
    )
    .with_metadata("repository", name)
    .with_metadata("baseCommit", base)
}

/// The local fast-forward pull failed.
pub fn git_pull_failed(name: &str, cause: &ErrorEnvelope) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_class(
        ErrorCode::new("repo", "git_pull"),
        format!("git pull for {name} failed: {}", cause.message),
        ErrorClass::Retriable,
    )
    .with_metadata("repository", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert!(already_exists("demo").code.is("repo", "already_exists"));
        assert!(repository_not_found("demo").code.is("repo", "not_found"));
        assert!(missing_commit_sha("demo").code.is("repo", "missing_commit_sha"));
        assert!(
            change_threshold_exceeded("demo", 501, 500)
                .code
                .is("repo", "change_threshold_exceeded")
        );
        assert!(force_push_detected("demo", "abc").code.is("repo", "force_push_detected"));
    }

    #[test]
    fn threshold_error_carries_guidance() {
        let error = change_threshold_exceeded("demo", 501, 500);
        assert!(error.message.contains("501"));
        assert!(error.message.contains("500"));
        assert!(error.message.contains("re-index"));
    }

    #[test]
    fn concurrent_update_carries_started_at() {
        let started_at = Utc::now();
        let error = concurrent_update("demo", Some(started_at));
        assert_eq!(
            error.metadata.get("updateStartedAt"),
            Some(&started_at.to_rfc3339())
        );
    }

    #[test]
    fn retry_classification_matches_taxonomy() {
        assert!(indexing_in_progress("demo").class.is_retriable());
        let cause = ErrorEnvelope::expected(ErrorCode::io(), "disk gone");
        assert!(git_pull_failed("demo", &cause).class.is_retriable());
        assert!(!already_exists("demo").class.is_retriable());
    }
}
