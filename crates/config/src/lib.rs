//! # codesync-config
//!
//! Configuration schema, validation, and environment overrides for the
//! codesync service. This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Configuration schema types and helpers.
pub mod schema;

pub use env::{ENV_PREFIX, apply_env_overrides, apply_env_overrides_std};
pub use schema::{
    ConfigError, DEFAULT_INCLUDE_EXTENSIONS, EmbeddingConfig, ForgeConfig, GraphConfig,
    IndexingConfig, LoggingConfig, ServiceConfig, StorageConfig, VectorStoreConfig,
    load_config_from_path, parse_config_json, parse_config_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
