//! Git client adapter shelling out to the `git` binary.

use codesync_domain::CommitSha;
use codesync_ports::{BoxFuture, GitPort};
use codesync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::Path;
use tokio::process::Command;

/// Git adapter driving the system `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    /// Build a git adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let output = command.output().await.map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("git", "spawn_failed"),
            format!("failed to run git: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::new("git", "command_failed"),
            format!("git {} failed: {}", args.join(" "), stderr.trim()),
            ErrorClass::Retriable,
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl GitPort for GitCli {
    fn clone_repository(
        &self,
        _ctx: &RequestContext,
        url: &str,
        branch: Option<&str>,
        dest: &Path,
    ) -> BoxFuture<'_, Result<()>> {
        let url = url.to_owned();
        let branch = branch.map(str::to_owned);
        let dest = dest.to_path_buf();
        Box::pin(async move {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(ErrorEnvelope::from)?;
            }
            let dest_str = dest.to_string_lossy().into_owned();
            let mut args = vec!["clone", "--single-branch"];
            if let Some(branch) = branch.as_deref() {
                args.push("--branch");
                args.push(branch);
            }
            args.push(url.as_str());
            args.push(dest_str.as_str());
            run_git(&args, None).await?;
            Ok(())
        })
    }

    fn pull(
        &self,
        _ctx: &RequestContext,
        local_path: &Path,
        branch: &str,
    ) -> BoxFuture<'_, Result<()>> {
        let local_path = local_path.to_path_buf();
        let branch = branch.to_owned();
        Box::pin(async move {
            run_git(&["fetch", "origin", branch.as_str()], Some(&local_path)).await?;
            let upstream = format!("origin/{branch}");
            run_git(
                &["merge", "--ff-only", upstream.as_str()],
                Some(&local_path),
            )
            .await?;
            Ok(())
        })
    }

    fn head_sha(
        &self,
        _ctx: &RequestContext,
        local_path: &Path,
    ) -> BoxFuture<'_, Result<CommitSha>> {
        let local_path = local_path.to_path_buf();
        Box::pin(async move {
            let stdout = run_git(&["rev-parse", "HEAD"], Some(&local_path)).await?;
            CommitSha::parse(stdout).map_err(ErrorEnvelope::from)
        })
    }

    fn current_branch(
        &self,
        _ctx: &RequestContext,
        local_path: &Path,
    ) -> BoxFuture<'_, Result<String>> {
        let local_path = local_path.to_path_buf();
        Box::pin(async move { run_git(&["rev-parse", "--abbrev-ref", "HEAD"], Some(&local_path)).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The binary-level behavior is covered in environments with git on PATH;
    // these tests pin the error mapping.

    #[tokio::test]
    async fn failed_command_surfaces_stderr() {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(_) => return,
        };
        // Not a repository: rev-parse fails with a git error.
        let result = run_git(&["rev-parse", "HEAD"], Some(dir.path())).await;
        match result {
            Err(error) => {
                assert!(
                    error.code.is("git", "command_failed") || error.code.is("git", "spawn_failed")
                );
            },
            Ok(_) => {
                // A git repo above the tempdir resolved HEAD; nothing to pin.
            },
        }
    }
}
