//! codesync CLI.
//!
//! Exit codes: 0 success, 1 pre-flight error, 2 partial result (operation
//! completed with per-file errors), 3 fatal runtime error.

mod commands;
mod exit;

use clap::{Parser, Subcommand};
use codesync_config::{ServiceConfig, apply_env_overrides_std, load_config_from_path};
use codesync_infra::{build_service, report_interrupted_updates};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "codesync",
    version,
    about = "Repository indexing service for semantic code search"
)]
struct Cli {
    /// Path to a TOML or JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Clone and index a repository.
    Index {
        /// Repository URL (https or git@ form).
        url: String,
        /// Branch to track (remote default when omitted).
        #[arg(long)]
        branch: Option<String>,
        /// Rebuild an existing index.
        #[arg(long)]
        force: bool,
        /// Extensions to index (repeatable; defaults apply when omitted).
        #[arg(long = "include-ext")]
        include_extensions: Vec<String>,
        /// Glob patterns to exclude (repeatable).
        #[arg(long = "exclude")]
        exclude_patterns: Vec<String>,
    },
    /// Apply remote changes to an indexed repository.
    Update {
        /// Repository name.
        name: String,
        /// Fall back to a full re-index when the incremental path is
        /// rejected (force push or change threshold).
        #[arg(long)]
        force: bool,
    },
    /// Remove a repository's index and metadata.
    Remove {
        /// Repository name.
        name: String,
    },
    /// Clear an update lease left over from a crash.
    Recover {
        /// Repository name.
        name: String,
        /// Also mark the repository as errored so operators force a
        /// re-index instead of resuming updates.
        #[arg(long)]
        mark_error: bool,
    },
    /// Show indexed repositories and update metrics.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ServiceConfig, codesync_config::ConfigError> {
    let mut config = match path {
        Some(path) => load_config_from_path(path)?,
        None => ServiceConfig::default(),
    };
    apply_env_overrides_std(&mut config)?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("codesync: {error}");
            std::process::exit(exit::PRE_FLIGHT);
        },
    };

    let service = match build_service(&config) {
        Ok(service) => service,
        Err(error) => {
            eprintln!("codesync: {}", error.message);
            std::process::exit(exit::FATAL);
        },
    };

    match report_interrupted_updates(&service).await {
        Ok(reports) => {
            for report in &reports {
                eprintln!(
                    "codesync: {} has an interrupted update; run `codesync recover {}` (or --mark-error)",
                    report.repository_name, report.repository_name
                );
            }
        },
        Err(error) => {
            tracing::warn!(error = %error.message, "startup recovery scan failed");
        },
    }

    let code = match cli.command {
        Command::Index {
            url,
            branch,
            force,
            include_extensions,
            exclude_patterns,
        } => {
            commands::index::run(
                &service,
                &url,
                branch,
                force,
                include_extensions,
                exclude_patterns,
            )
            .await
        },
        Command::Update { name, force } => commands::update::run(&service, &name, force).await,
        Command::Remove { name } => commands::remove::run(&service, &name).await,
        Command::Recover { name, mark_error } => {
            commands::recover::run(&service, &name, mark_error).await
        },
        Command::Status { json } => commands::status::run(&service, json).await,
    };

    std::process::exit(code);
}
