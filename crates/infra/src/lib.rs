//! # codesync-infra
//!
//! Factories wiring configuration to adapters and the orchestrator.
//! This crate depends on `config`, `adapters`, and `app`.

pub mod service;

pub use service::{Service, build_service, report_interrupted_updates};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
