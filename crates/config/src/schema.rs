//! Configuration schema types and helpers.

use codesync_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Extensions indexed when a repository specifies none.
pub const DEFAULT_INCLUDE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "rs", "go", "java", "kt", "rb", "php", "c", "h",
    "cpp", "hpp", "cs", "swift", "scala", "md", "json", "yaml", "yml", "toml",
];

/// Configuration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file could not be parsed.
    Parse {
        /// Parser message.
        message: String,
    },
    /// A field holds an invalid value.
    InvalidValue {
        /// Offending field, dotted path.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// Config file could not be read.
    Io {
        /// Underlying message.
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { message } => write!(formatter, "config parse error: {message}"),
            Self::InvalidValue { field, reason } => {
                write!(formatter, "invalid config value for {field}: {reason}")
            },
            Self::Io { message } => write!(formatter, "config read error: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for ErrorEnvelope {
    fn from(error: ConfigError) -> Self {
        Self::expected(ErrorCode::new("config", "invalid"), error.to_string())
    }
}

/// Indexing pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexingConfig {
    /// Files per processing batch.
    pub file_batch_size: usize,
    /// Chunk contents per embedding provider call.
    pub embedding_batch_size: usize,
    /// Maximum files in one incremental update (inclusive).
    pub change_file_threshold: usize,
    /// Newest-first ring size for update history entries.
    pub update_history_limit: usize,
    /// Pending-unlink lifetime for rename correlation.
    pub rename_window_ms: u64,
    /// Service-wide default include extensions (empty means the built-in
    /// defaults apply).
    pub include_extensions: Vec<String>,
    /// Service-wide default exclude globs.
    pub exclude_patterns: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            file_batch_size: 50,
            embedding_batch_size: 100,
            change_file_threshold: 500,
            update_history_limit: 10,
            rename_window_ms: 500,
            include_extensions: Vec::new(),
            exclude_patterns: vec![
                "node_modules/**".to_string(),
                "target/**".to_string(),
                "dist/**".to_string(),
                ".git/**".to_string(),
            ],
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Root data directory.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".codesync"),
        }
    }
}

impl StorageConfig {
    /// Path of the metadata JSON document.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("repositories.json")
    }

    /// Directory holding repository clones.
    #[must_use]
    pub fn clones_dir(&self) -> PathBuf {
        self.data_dir.join("clones")
    }
}

/// Remote forge commit API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForgeConfig {
    /// Forge host accepted by the URL parser.
    pub host: String,
    /// Commit API base URL.
    pub api_base_url: String,
    /// Optional bearer token (redacted in logs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            host: "github.com".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            token: None,
            timeout_ms: 30_000,
        }
    }
}

/// Embedding provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingConfig {
    /// Provider base URL.
    pub base_url: String,
    /// Model name sent with requests.
    pub model: String,
    /// Optional API key (redacted in logs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Embedding dimensionality.
    pub dimensions: u32,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            dimensions: 768,
            timeout_ms: 60_000,
        }
    }
}

/// Vector store endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorStoreConfig {
    /// Store base URL.
    pub base_url: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Optional structural graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphConfig {
    /// Whether graph side-effects run at all.
    pub enabled: bool,
    /// Graph service base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Minimum level (`debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit one JSON object per line.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Root service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Indexing pipeline tuning.
    pub indexing: IndexingConfig,
    /// Storage locations.
    pub storage: StorageConfig,
    /// Remote forge commit API.
    pub forge: ForgeConfig,
    /// Embedding provider endpoint.
    pub embedding: EmbeddingConfig,
    /// Vector store endpoint.
    pub vector_store: VectorStoreConfig,
    /// Optional structural graph store.
    pub graph: GraphConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Validate field ranges after parsing and overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indexing.file_batch_size == 0 {
            return Err(invalid("indexing.fileBatchSize", "must be greater than zero"));
        }
        if self.indexing.embedding_batch_size == 0 {
            return Err(invalid(
                "indexing.embeddingBatchSize",
                "must be greater than zero",
            ));
        }
        if self.indexing.update_history_limit == 0 {
            return Err(invalid(
                "indexing.updateHistoryLimit",
                "must be greater than zero",
            ));
        }
        if self.indexing.rename_window_ms == 0 {
            return Err(invalid("indexing.renameWindowMs", "must be greater than zero"));
        }
        if self.embedding.dimensions == 0 {
            return Err(invalid("embedding.dimensions", "must be greater than zero"));
        }
        if self.forge.host.trim().is_empty() {
            return Err(invalid("forge.host", "must be non-empty"));
        }
        Ok(())
    }

    /// Effective include extensions for a repository: per-repository list,
    /// falling back to the service list, falling back to built-in defaults.
    #[must_use]
    pub fn effective_include_extensions(&self, repository: &[String]) -> Vec<String> {
        if !repository.is_empty() {
            return repository.to_vec();
        }
        if !self.indexing.include_extensions.is_empty() {
            return self.indexing.include_extensions.clone();
        }
        DEFAULT_INCLUDE_EXTENSIONS
            .iter()
            .map(|ext| (*ext).to_string())
            .collect()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Parse a TOML config document.
pub fn parse_config_toml(input: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(input).map_err(|error| ConfigError::Parse {
        message: error.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Parse a JSON config document.
pub fn parse_config_json(input: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_json::from_str(input).map_err(|error| ConfigError::Parse {
        message: error.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load a config file, dispatching on the extension (`.toml` or `.json`).
pub fn load_config_from_path(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
        message: format!("{}: {error}", path.display()),
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_config_json(&raw),
        _ => parse_config_toml(&raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.indexing.file_batch_size, 50);
        assert_eq!(config.indexing.embedding_batch_size, 100);
        assert_eq!(config.indexing.change_file_threshold, 500);
        assert_eq!(config.indexing.update_history_limit, 10);
        assert_eq!(config.indexing.rename_window_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_merge_with_defaults() -> Result<(), ConfigError> {
        let config = parse_config_toml(
            r#"
            [indexing]
            fileBatchSize = 10

            [forge]
            host = "git.internal.example"
            apiBaseUrl = "https://git.internal.example/api/v3"
            "#,
        )?;
        assert_eq!(config.indexing.file_batch_size, 10);
        assert_eq!(config.indexing.embedding_batch_size, 100);
        assert_eq!(config.forge.host, "git.internal.example");
        Ok(())
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let result = parse_config_toml("[indexing]\nfileBatchSize = 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "indexing.fileBatchSize",
                ..
            })
        ));
    }

    #[test]
    fn include_extension_fallback_chain() {
        let mut config = ServiceConfig::default();
        let per_repo = vec!["rs".to_string()];
        assert_eq!(config.effective_include_extensions(&per_repo), per_repo);

        config.indexing.include_extensions = vec!["py".to_string()];
        assert_eq!(
            config.effective_include_extensions(&[]),
            vec!["py".to_string()]
        );

        config.indexing.include_extensions.clear();
        assert_eq!(
            config.effective_include_extensions(&[]).len(),
            DEFAULT_INCLUDE_EXTENSIONS.len()
        );
    }

    #[test]
    fn storage_paths_derive_from_data_dir() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/var/lib/codesync"),
        };
        assert_eq!(
            storage.metadata_path(),
            PathBuf::from("/var/lib/codesync/repositories.json")
        );
        assert_eq!(
            storage.clones_dir(),
            PathBuf::from("/var/lib/codesync/clones")
        );
    }
}
