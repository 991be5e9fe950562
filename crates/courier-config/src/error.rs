//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or preparing a path failed.
    #[error("configuration io failure")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration document was not valid JSON or had unknown fields.
    #[error("configuration document could not be parsed")]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Source serde error.
        source: serde_json::Error,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Two directory roots point at the same location.
    #[error("configured directories must be distinct")]
    DuplicateDirectory {
        /// First field sharing the location.
        first: &'static str,
        /// Second field sharing the location.
        second: &'static str,
        /// Shared location.
        path: PathBuf,
    },
    /// One directory root sits inside another.
    #[error("configured directories must not be nested")]
    NestedDirectory {
        /// Field holding the enclosing directory.
        outer: &'static str,
        /// Field holding the nested directory.
        inner: &'static str,
        /// Nested location.
        path: PathBuf,
    },
}

impl ConfigError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(
        field: &'static str,
        reason: &'static str,
        value: Option<String>,
    ) -> Self {
        Self::InvalidField {
            field,
            reason,
            value,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_messages_stay_constant() {
        let io_err = ConfigError::io("read", "config.json", io::Error::other("io"));
        assert_eq!(io_err.to_string(), "configuration io failure");
        assert!(io_err.source().is_some());

        let invalid = ConfigError::invalid("quiet_period_secs", "zero", Some("0".into()));
        assert_eq!(invalid.to_string(), "invalid configuration field");
        assert!(invalid.source().is_none());
    }
}
