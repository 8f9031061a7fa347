//! `codesync index` / the forced re-index path.

use crate::exit;
use codesync_app::IngestRequest;
use codesync_domain::IngestStatus;
use codesync_infra::Service;

pub async fn run(
    service: &Service,
    url: &str,
    branch: Option<String>,
    force: bool,
    include_extensions: Vec<String>,
    exclude_patterns: Vec<String>,
) -> i32 {
    let request = IngestRequest {
        branch,
        include_extensions,
        exclude_patterns,
        force,
    };
    match service.orchestrator.index_repository(url, request).await {
        Ok(output) => {
            println!(
                "indexed {}: {} files, {} chunks in {} ms",
                output.repository, output.file_count, output.chunk_count, output.duration_ms
            );
            if let Some(sha) = output.commit_sha.as_ref() {
                println!("commit: {}", sha.short());
            }
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
