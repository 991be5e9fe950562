//! Reads the configuration document from disk.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::defaults::CONFIG_FILE;
use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;
use crate::validate::validate;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "COURIER_CONFIG";

/// Resolve the configuration path from `COURIER_CONFIG`, falling back to
/// `config.json` in the working directory.
#[must_use]
pub fn config_path_from_env() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from)
}

/// Load and validate the configuration at the path named by the environment.
///
/// # Errors
///
/// See [`load_from_path`].
pub fn load_from_env() -> ConfigResult<AppConfig> {
    load_from_path(&config_path_from_env())
}

/// Load and validate the configuration document at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read,
/// [`ConfigError::Parse`] when it is malformed or carries unrecognized
/// options, and the validation errors from [`validate`].
pub fn load_from_path(path: &Path) -> ConfigResult<AppConfig> {
    let raw = fs::read_to_string(path).map_err(|err| ConfigError::io("read", path, err))?;
    let config: AppConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&config)?;
    info!(
        path = %path.display(),
        unprocessed = %config.unprocessed_dir.display(),
        upload_backend = config.upload.backend(),
        quiet_period_secs = config.quiet_period_secs,
        "configuration loaded"
    );
    Ok(config)
}
