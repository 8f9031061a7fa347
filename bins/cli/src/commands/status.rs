//! `codesync status`.

use crate::exit;
use codesync_domain::RepositoryStatus;
use codesync_infra::Service;
use serde_json::json;

pub async fn run(service: &Service, as_json: bool) -> i32 {
    let status = match service.orchestrator.get_status().await {
        Ok(status) => status,
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            return exit::code_for_error(&error);
        },
    };

    if as_json {
        let payload = json!({
            "repositories": status.repositories,
            "metrics": status.metrics,
            "ingesting": status.ingesting,
        });
        match serde_json::to_string_pretty(&payload) {
            Ok(encoded) => println!("{encoded}"),
            Err(error) => {
                eprintln!("codesync: failed to encode status: {error}");
                return exit::FATAL;
            },
        }
        return exit::SUCCESS;
    }

    if status.repositories.is_empty() {
        println!("no repositories indexed");
        return exit::SUCCESS;
    }

    for record in &status.repositories {
        let state = match record.status {
            RepositoryStatus::Ready => "ready",
            RepositoryStatus::Indexing => "indexing",
            RepositoryStatus::Error => "error",
        };
        let commit = record
            .last_indexed_commit_sha
            .as_ref()
            .map_or_else(|| "-".to_string(), |sha| sha.short().to_string());
        println!(
            "{:<24} {:<9} {:>6} files {:>8} chunks  commit {}  updates {}{}",
            record.name.as_str(),
            state,
            record.file_count,
            record.chunk_count,
            commit,
            record.incremental_update_count,
            if record.update_in_progress {
                "  [update in progress]"
            } else {
                ""
            }
        );
        if let Some(message) = record.error_message.as_deref() {
            println!("    last error: {message}");
        }
    }

    let metrics = &status.metrics;
    println!(
        "updates: {} total, {:.0} ms avg, {:.0}% success ({} files, {} chunks touched)",
        metrics.total_updates,
        metrics.average_duration_ms,
        metrics.success_rate * 100.0,
        metrics.total_files_processed,
        metrics.total_chunks_modified
    );
    if let Some(ingesting) = status.ingesting.as_deref() {
        println!("ingesting: {ingesting}");
    }
    exit::SUCCESS
}
