//! `codesync recover`: remediate an update lease left over from a crash.

use crate::exit;
use codesync_app::{clear_interrupted_flag, mark_as_interrupted};
use codesync_domain::RepositoryName;
use codesync_infra::Service;
use codesync_shared::{ErrorEnvelope, RequestContext};

pub async fn run(service: &Service, name: &str, mark_error: bool) -> i32 {
    let name = match RepositoryName::parse(name).map_err(ErrorEnvelope::from) {
        Ok(name) => name,
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            return exit::code_for_error(&error);
        },
    };

    let ctx = RequestContext::new_operation();
    let result = if mark_error {
        mark_as_interrupted(&ctx, &service.metadata, &name).await
    } else {
        clear_interrupted_flag(&ctx, &service.metadata, &name).await
    };

    match result {
        Ok(()) => {
            if mark_error {
                println!("{name}: marked as interrupted; run `codesync index --force` to rebuild");
            } else {
                println!("{name}: update lease cleared");
            }
            exit::SUCCESS
        },
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            exit::code_for_error(&error)
        },
    }
}
