//! Filesystem boundary contract for clone working trees.

use crate::BoxFuture;
use chrono::{DateTime, Utc};
use codesync_shared::{RequestContext, Result};
use std::path::Path;

/// A file discovered while scanning a clone root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the scan root, `/`-separated.
    pub relative_path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Filesystem modification time.
    pub modified_at: DateTime<Utc>,
}

impl ScannedFile {
    /// Lowercased extension without the dot, empty when absent.
    #[must_use]
    pub fn extension(&self) -> String {
        extension_of(&self.relative_path)
    }
}

/// Lowercased extension of a `/`-separated relative path, without the dot.
#[must_use]
pub fn extension_of(relative_path: &str) -> String {
    let basename = relative_path
        .rsplit('/')
        .next()
        .unwrap_or(relative_path);
    match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Boundary contract for reading clone working trees.
pub trait FileSystemPort: Send + Sync {
    /// Recursively list regular files under `root` (relative paths).
    fn list_files(&self, ctx: &RequestContext, root: &Path)
    -> BoxFuture<'_, Result<Vec<ScannedFile>>>;

    /// Read a file under `root` as UTF-8 text.
    fn read_file_text(
        &self,
        ctx: &RequestContext,
        root: &Path,
        relative_path: &str,
    ) -> BoxFuture<'_, Result<String>>;

    /// Stat a file under `root`. `Ok(None)` when it does not exist.
    fn stat_file(
        &self,
        ctx: &RequestContext,
        root: &Path,
        relative_path: &str,
    ) -> BoxFuture<'_, Result<Option<ScannedFile>>>;

    /// Returns true when `path` exists and is a directory.
    fn dir_exists(&self, ctx: &RequestContext, path: &Path) -> BoxFuture<'_, Result<bool>>;

    /// Recursively remove a directory. Succeeds when absent.
    fn remove_dir_all(&self, ctx: &RequestContext, path: &Path) -> BoxFuture<'_, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_without_dot() {
        assert_eq!(extension_of("src/Main.RS"), "rs");
        assert_eq!(extension_of("a/b/c.tar.gz"), "gz");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".gitignore"), "");
    }
}
