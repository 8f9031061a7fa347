//! Environment variable overrides.
//!
//! Every recognized variable is prefixed `CODESYNC_`. Unknown variables
//! under the prefix are ignored; malformed values for recognized variables
//! are rejected.

use crate::schema::{ConfigError, ServiceConfig};
use std::path::PathBuf;

/// Prefix shared by all recognized environment variables.
pub const ENV_PREFIX: &str = "CODESYNC_";

/// Apply overrides from an explicit variable iterator (testable form).
pub fn apply_env_overrides<I>(config: &mut ServiceConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(suffix) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        apply_one(config, suffix, &value)?;
    }
    config.validate()
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides_std(config: &mut ServiceConfig) -> Result<(), ConfigError> {
    apply_env_overrides(config, std::env::vars())
}

fn apply_one(config: &mut ServiceConfig, suffix: &str, value: &str) -> Result<(), ConfigError> {
    match suffix {
        "FILE_BATCH_SIZE" => {
            config.indexing.file_batch_size = parse_number(suffix, value)?;
        },
        "EMBEDDING_BATCH_SIZE" => {
            config.indexing.embedding_batch_size = parse_number(suffix, value)?;
        },
        "CHANGE_FILE_THRESHOLD" => {
            config.indexing.change_file_threshold = parse_number(suffix, value)?;
        },
        "UPDATE_HISTORY_LIMIT" => {
            config.indexing.update_history_limit = parse_number(suffix, value)?;
        },
        "RENAME_WINDOW_MS" => {
            config.indexing.rename_window_ms = parse_number(suffix, value)?;
        },
        "DATA_DIR" => {
            config.storage.data_dir = PathBuf::from(value);
        },
        "FORGE_HOST" => {
            config.forge.host = value.to_string();
        },
        "FORGE_API_BASE_URL" => {
            config.forge.api_base_url = value.to_string();
        },
        "FORGE_TOKEN" => {
            config.forge.token = Some(value.to_string());
        },
        "EMBEDDING_BASE_URL" => {
            config.embedding.base_url = value.to_string();
        },
        "EMBEDDING_MODEL" => {
            config.embedding.model = value.to_string();
        },
        "EMBEDDING_API_KEY" => {
            config.embedding.api_key = Some(value.to_string());
        },
        "EMBEDDING_DIMENSIONS" => {
            config.embedding.dimensions = parse_number(suffix, value)?;
        },
        "VECTOR_STORE_BASE_URL" => {
            config.vector_store.base_url = value.to_string();
        },
        "GRAPH_ENABLED" => {
            config.graph.enabled = parse_bool(suffix, value)?;
        },
        "GRAPH_BASE_URL" => {
            config.graph.base_url = Some(value.to_string());
        },
        "LOG_LEVEL" => {
            config.logging.level = value.to_string();
        },
        "LOG_JSON" => {
            config.logging.json = parse_bool(suffix, value)?;
        },
        _ => {},
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(suffix: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Parse {
        message: format!("{ENV_PREFIX}{suffix} must be a number, got {value:?}"),
    })
}

fn parse_bool(suffix: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Parse {
            message: format!("{ENV_PREFIX}{suffix} must be a boolean, got {value:?}"),
        }),
    }
}
