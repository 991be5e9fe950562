//! Application-level errors for bootstrap and the watch loop.
//!
//! Messages stay constant; context lives in the variant fields.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Boxed collaborator failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: courier_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: courier_telemetry::TelemetryError,
    },
    /// Lookup store operations failed.
    #[error("lookup store operation failed")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Source data error.
        source: courier_data::DataError,
    },
    /// A startup connectivity check failed.
    #[error("startup check failed")]
    StartupCheck {
        /// Component that failed its check.
        component: &'static str,
        /// Underlying failure.
        source: BoxError,
    },
    /// The filesystem watcher could not be started.
    #[error("filesystem watch failed")]
    Watch {
        /// Watched path.
        path: PathBuf,
        /// Underlying notify error.
        source: notify::Error,
    },
    /// HTTP client construction failed.
    #[error("http client setup failed")]
    HttpClient {
        /// Underlying reqwest error.
        source: reqwest::Error,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: courier_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: courier_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn data(operation: &'static str, source: courier_data::DataError) -> Self {
        Self::Data { operation, source }
    }

    pub(crate) fn startup_check(component: &'static str, source: anyhow::Error) -> Self {
        Self::StartupCheck {
            component,
            source: source.into(),
        }
    }
}
