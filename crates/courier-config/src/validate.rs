//! Startup precondition checks for a loaded configuration.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, DirectoryLayout, UploadConfig};

/// Validate field values and the lexical relationship of the directory roots.
///
/// # Errors
///
/// Returns the first violated precondition.
pub fn validate(config: &AppConfig) -> ConfigResult<()> {
    if config.quiet_period_secs == 0 {
        return Err(ConfigError::invalid(
            "quiet_period_secs",
            "must_be_positive",
            Some("0".to_string()),
        ));
    }
    if config.snapshot_path.as_os_str().is_empty() {
        return Err(ConfigError::invalid("snapshot_path", "empty", None));
    }
    require_non_empty("postgres.host", &config.postgres.host)?;
    require_non_empty("postgres.database", &config.postgres.database)?;
    require_non_empty("postgres.user", &config.postgres.user)?;
    if config.postgres.port == 0 {
        return Err(ConfigError::invalid(
            "postgres.port",
            "must_be_positive",
            Some("0".to_string()),
        ));
    }

    match &config.upload {
        UploadConfig::Directory { root } => {
            if root.as_os_str().is_empty() {
                return Err(ConfigError::invalid("upload.root", "empty", None));
            }
        }
        UploadConfig::Http { endpoint, token } => {
            require_non_empty("upload.endpoint", endpoint)?;
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::invalid(
                    "upload.endpoint",
                    "unsupported_scheme",
                    Some(endpoint.clone()),
                ));
            }
            if token.as_deref().is_some_and(|value| value.trim().is_empty()) {
                return Err(ConfigError::invalid("upload.token", "empty", None));
            }
        }
    }

    if let Some(remote) = &config.remote_log {
        require_non_empty("remote_log.log_group", &remote.log_group)?;
        require_non_empty("remote_log.stream_name", &remote.stream_name)?;
    }

    let layout = config.layout();
    for (field, path) in layout.entries() {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::invalid(field, "empty", None));
        }
    }
    check_disjoint(&layout, normalize_lexically)
}

/// Create the directory roots, resolve them to canonical paths, and re-check
/// that they are distinct once symlinks are followed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when a root cannot be created or resolved and
/// the distinctness errors from [`validate`] when roots alias one another.
pub fn prepare_layout(layout: &DirectoryLayout) -> ConfigResult<DirectoryLayout> {
    let mut resolved = Vec::with_capacity(3);
    for (field, path) in layout.entries() {
        fs::create_dir_all(path).map_err(|err| ConfigError::io("create_dir_all", path, err))?;
        let canonical =
            fs::canonicalize(path).map_err(|err| ConfigError::io("canonicalize", path, err))?;
        if !canonical.is_dir() {
            return Err(ConfigError::invalid(
                field,
                "not_a_directory",
                Some(canonical.display().to_string()),
            ));
        }
        debug!(field, path = %canonical.display(), "directory root ready");
        resolved.push(canonical);
    }

    let mut resolved = resolved.into_iter();
    let (Some(unprocessed), Some(done), Some(error)) =
        (resolved.next(), resolved.next(), resolved.next())
    else {
        return Err(ConfigError::invalid("layout", "incomplete", None));
    };
    let prepared = DirectoryLayout {
        unprocessed,
        done,
        error,
    };
    check_disjoint(&prepared, Path::to_path_buf)?;
    Ok(prepared)
}

fn require_non_empty(field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        Err(ConfigError::invalid(field, "empty", None))
    } else {
        Ok(())
    }
}

fn check_disjoint(layout: &DirectoryLayout, normalize: fn(&Path) -> PathBuf) -> ConfigResult<()> {
    let entries: Vec<(&'static str, PathBuf)> = layout
        .entries()
        .into_iter()
        .map(|(field, path)| (field, normalize(path)))
        .collect();

    for (index, (first_field, first)) in entries.iter().enumerate() {
        for (second_field, second) in entries.iter().skip(index + 1) {
            if first == second {
                return Err(ConfigError::DuplicateDirectory {
                    first: first_field,
                    second: second_field,
                    path: first.clone(),
                });
            }
            if second.starts_with(first) {
                return Err(ConfigError::NestedDirectory {
                    outer: first_field,
                    inner: second_field,
                    path: second.clone(),
                });
            }
            if first.starts_with(second) {
                return Err(ConfigError::NestedDirectory {
                    outer: second_field,
                    inner: first_field,
                    path: first.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
