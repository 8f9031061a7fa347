//! `codesync update`.

use crate::exit;
use codesync_app::IngestRequest;
use codesync_domain::{IngestStatus, UpdateOutcome};
use codesync_infra::Service;
use codesync_shared::ErrorEnvelope;

pub async fn run(service: &Service, name: &str, force: bool) -> i32 {
    match service.orchestrator.update_repository(name).await {
        Ok(output) => {
            match output.status {
                UpdateOutcome::NoChanges => {
                    println!("{name}: already up to date at {}", output.commit_sha.short());
                },
                UpdateOutcome::Updated | UpdateOutcome::Failed => {
                    println!(
                        "{name}: {} at {} (+{} ~{} -{} files, +{} -{} chunks, {} ms)",
                        output.status.as_str(),
                        output.commit_sha.short(),
                        output.stats.files_added,
                        output.stats.files_modified,
                        output.stats.files_deleted,
                        output.stats.chunks_upserted,
                        output.stats.chunks_deleted,
                        output.duration_ms
                    );
                },
            }
            for error in &output.errors {
                eprintln!("  {}: {}", error.path, error.error);
            }
            match output.status {
                UpdateOutcome::NoChanges => exit::SUCCESS,
                UpdateOutcome::Updated => {
                    if output.errors.is_empty() {
                        exit::SUCCESS
                    } else {
                        exit::PARTIAL
                    }
                },
                UpdateOutcome::Failed => exit::FATAL,
            }
        },
        Err(error) if force && needs_full_reindex(&error) => {
            eprintln!("codesync: {}; running a full re-index", error.message);
            reindex(service, name).await
        },
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            exit::code_for_error(&error)
        },
    }
}

/// Rejections whose documented remediation is a full re-index.
fn needs_full_reindex(error: &ErrorEnvelope) -> bool {
    error.code.is("repo", "force_push_detected")
        || error.code.is("repo", "change_threshold_exceeded")
}

async fn reindex(service: &Service, name: &str) -> i32 {
    let status = match service.orchestrator.get_status().await {
        Ok(status) => status,
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            return exit::code_for_error(&error);
        },
    };
    let Some(record) = status
        .repositories
        .iter()
        .find(|record| record.name.as_str() == name)
    else {
        eprintln!("codesync: repository {name} is not indexed");
        return exit::PRE_FLIGHT;
    };

    let request = IngestRequest {
        branch: Some(record.branch.clone()),
        include_extensions: record.include_extensions.clone(),
        exclude_patterns: record.exclude_patterns.clone(),
        force: true,
    };
    match service
        .orchestrator
        .reindex_repository(&record.url, request)
        .await
    {
        Ok(output) => {
            println!(
                "re-indexed {}: {} files, {} chunks in {} ms",
                output.repository, output.file_count, output.chunk_count, output.duration_ms
            );
            for error in &output.errors {
                eprintln!("  {}: {}", error.path, error.error);
            }
            match output.status {
                IngestStatus::Success => exit::SUCCESS,
                IngestStatus::Partial => exit::PARTIAL,
                IngestStatus::Failed => exit::FATAL,
            }
        },
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            exit::code_for_error(&error)
        },
    }
}
