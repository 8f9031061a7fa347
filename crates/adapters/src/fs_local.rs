//! Local filesystem adapters using async IO.

use chrono::{DateTime, Utc};
use codesync_ports::{BoxFuture, FileStatInfo, FileStatPort, FileSystemPort, ScannedFile};
use codesync_shared::{ErrorEnvelope, RequestContext, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Local filesystem adapter for clone working trees.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Build a filesystem adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

fn relative_string(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|relative| relative.to_string_lossy().replace('\\', "/"))
}

async fn walk_files(root: &Path) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(ErrorEnvelope::from)?;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorEnvelope::from)? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(ErrorEnvelope::from)?;
            if file_type.is_dir() {
                // The .git directory is never index material.
                if entry.file_name() != ".git" {
                    stack.push(path);
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            let metadata = entry.metadata().await.map_err(ErrorEnvelope::from)?;
            let modified_at = metadata
                .modified()
                .map(system_time_to_utc)
                .unwrap_or_else(|_| Utc::now());
            if let Some(relative_path) = relative_string(root, &path) {
                files.push(ScannedFile {
                    relative_path,
                    size_bytes: metadata.len(),
                    modified_at,
                });
            }
        }
    }
    Ok(files)
}

impl FileSystemPort for LocalFileSystem {
    fn list_files(
        &self,
        _ctx: &RequestContext,
        root: &Path,
    ) -> BoxFuture<'_, Result<Vec<ScannedFile>>> {
        let root = root.to_path_buf();
        Box::pin(async move { walk_files(&root).await })
    }

    fn read_file_text(
        &self,
        _ctx: &RequestContext,
        root: &Path,
        relative_path: &str,
    ) -> BoxFuture<'_, Result<String>> {
        let path = root.join(relative_path);
        Box::pin(async move {
            tokio::fs::read_to_string(&path)
                .await
                .map_err(ErrorEnvelope::from)
        })
    }

    fn stat_file(
        &self,
        _ctx: &RequestContext,
        root: &Path,
        relative_path: &str,
    ) -> BoxFuture<'_, Result<Option<ScannedFile>>> {
        let path = root.join(relative_path);
        let relative_path = relative_path.to_owned();
        Box::pin(async move {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => Ok(Some(ScannedFile {
                    relative_path,
                    size_bytes: metadata.len(),
                    modified_at: metadata
                        .modified()
                        .map(system_time_to_utc)
                        .unwrap_or_else(|_| Utc::now()),
                })),
                Ok(_) => Ok(None),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(error) => Err(ErrorEnvelope::from(error)),
            }
        })
    }

    fn dir_exists(&self, _ctx: &RequestContext, path: &Path) -> BoxFuture<'_, Result<bool>> {
        let path = path.to_path_buf();
        Box::pin(async move {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) => Ok(metadata.is_dir()),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(error) => Err(ErrorEnvelope::from(error)),
            }
        })
    }

    fn remove_dir_all(&self, _ctx: &RequestContext, path: &Path) -> BoxFuture<'_, Result<()>> {
        let path = path.to_path_buf();
        Box::pin(async move {
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(error) => Err(ErrorEnvelope::from(error)),
            }
        })
    }
}

/// Local stat adapter for the change categorizer.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStat;

impl LocalFileStat {
    /// Build a stat adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FileStatPort for LocalFileStat {
    fn stat(
        &self,
        _ctx: &RequestContext,
        absolute_path: &Path,
    ) -> BoxFuture<'_, Result<Option<FileStatInfo>>> {
        let path = absolute_path.to_path_buf();
        Box::pin(async move {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => Ok(Some(FileStatInfo {
                    size_bytes: metadata.len(),
                    modified_at: metadata
                        .modified()
                        .map(system_time_to_utc)
                        .unwrap_or_else(|_| Utc::now()),
                })),
                Ok(_) => Ok(None),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(error) => Err(ErrorEnvelope::from(error)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_recursively_skipping_git_dir() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let root = dir.path();
        tokio::fs::create_dir_all(root.join("src/nested"))
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::create_dir_all(root.join(".git/objects"))
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("src/lib.rs"), "pub fn a() {}\n")
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join("src/nested/mod.rs"), "pub fn b() {}\n")
            .await
            .map_err(ErrorEnvelope::from)?;
        tokio::fs::write(root.join(".git/objects/abc"), "blob")
            .await
            .map_err(ErrorEnvelope::from)?;

        let ctx = RequestContext::new_operation();
        let adapter = LocalFileSystem::new();
        let mut files = adapter.list_files(&ctx, root).await?;
        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs", "src/nested/mod.rs"]);
        assert!(files.iter().all(|f| f.size_bytes > 0));
        Ok(())
    }

    #[tokio::test]
    async fn stat_and_read_round_trip() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let root = dir.path();
        tokio::fs::write(root.join("main.rs"), "fn main() {}\n")
            .await
            .map_err(ErrorEnvelope::from)?;

        let ctx = RequestContext::new_operation();
        let adapter = LocalFileSystem::new();

        let stat = adapter.stat_file(&ctx, root, "main.rs").await?;
        assert!(stat.is_some_and(|s| s.size_bytes == 13));
        assert!(adapter.stat_file(&ctx, root, "gone.rs").await?.is_none());

        let content = adapter.read_file_text(&ctx, root, "main.rs").await?;
        assert_eq!(content, "fn main() {}\n");
        Ok(())
    }

    #[tokio::test]
    async fn remove_dir_all_tolerates_missing_paths() -> Result<()> {
        let dir = tempfile::tempdir().map_err(ErrorEnvelope::from)?;
        let ctx = RequestContext::new_operation();
        let adapter = LocalFileSystem::new();
        adapter
            .remove_dir_all(&ctx, &dir.path().join("does-not-exist"))
            .await?;
        assert!(!adapter.dir_exists(&ctx, &dir.path().join("does-not-exist")).await?);
        Ok(())
    }
}
