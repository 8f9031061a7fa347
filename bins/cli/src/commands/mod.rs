//! Subcommand implementations.

pub mod index;
pub mod recover;
pub mod remove;
pub mod status;
pub mod update;
