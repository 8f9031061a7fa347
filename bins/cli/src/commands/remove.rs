//! `codesync remove`.

use crate::exit;
use codesync_infra::Service;

pub async fn run(service: &Service, name: &str) -> i32 {
    match service.orchestrator.remove_repository(name).await {
        Ok(()) => {
            println!("removed {name}");
            exit::SUCCESS
        },
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            exit::code_for_error(&error)
        },
    }
}
