//! Errors raised while persisting the reference snapshot.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for runtime persistence.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Snapshot persistence failures.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Filesystem failure while reading or writing the snapshot.
    #[error("snapshot io failure")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The snapshot could not be encoded or decoded.
    #[error("snapshot json failure")]
    Json {
        /// Operation that failed.
        operation: &'static str,
        /// Snapshot path.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

impl RuntimeError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether the snapshot file simply does not exist.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
