//! Typed configuration sections loaded from the JSON document.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Watched inbox directory.
    pub unprocessed_dir: PathBuf,
    /// Archive root for successfully routed files.
    pub done_dir: PathBuf,
    /// Archive root for files that failed somewhere in the pipeline.
    pub error_dir: PathBuf,
    /// Location of the persisted reference snapshot.
    #[serde(default = "defaults::snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Seconds of inactivity before a batch pass runs.
    #[serde(default = "defaults::quiet_period_secs")]
    pub quiet_period_secs: u64,
    /// Whether archived files are partitioned under a `YYYY-MM-DD` folder.
    #[serde(default = "defaults::enabled")]
    pub date_subdirs: bool,
    /// Lookup store credentials.
    pub postgres: PostgresConfig,
    /// Upload backend selection.
    pub upload: UploadConfig,
    /// Optional remote log target.
    #[serde(default)]
    pub remote_log: Option<RemoteLogConfig>,
    /// Optional logging overrides.
    #[serde(default)]
    pub logging: Option<LoggingSettings>,
}

impl AppConfig {
    /// Quiet period as a [`Duration`].
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        Duration::from_secs(self.quiet_period_secs)
    }

    /// Copy of the three directory roots.
    #[must_use]
    pub fn layout(&self) -> DirectoryLayout {
        DirectoryLayout {
            unprocessed: self.unprocessed_dir.clone(),
            done: self.done_dir.clone(),
            error: self.error_dir.clone(),
        }
    }
}

/// The three directory roots the pipeline operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    /// Watched inbox.
    pub unprocessed: PathBuf,
    /// Done archive root.
    pub done: PathBuf,
    /// Error archive root.
    pub error: PathBuf,
}

impl DirectoryLayout {
    /// Field name and path pairs, in a stable order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &Path); 3] {
        [
            ("unprocessed_dir", self.unprocessed.as_path()),
            ("done_dir", self.done.as_path()),
            ("error_dir", self.error.as_path()),
        ]
    }
}

/// Connection settings for the relational lookup store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    /// Role used to connect.
    pub user: String,
    /// Password for the role.
    pub password: String,
    /// Server host name or address.
    pub host: String,
    /// Server port.
    #[serde(default = "defaults::postgres_port")]
    pub port: u16,
    /// Database name.
    pub database: String,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

/// Upload backend configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case", deny_unknown_fields)]
pub enum UploadConfig {
    /// Mirror files into a local or mounted directory tree.
    Directory {
        /// Root the destination folders are created under.
        root: PathBuf,
    },
    /// `PUT` files to an HTTP endpoint.
    Http {
        /// Base URL; the destination path is appended.
        endpoint: String,
        /// Optional bearer token.
        #[serde(default)]
        token: Option<String>,
    },
}

impl UploadConfig {
    /// Backend label used in logs and metrics.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Directory { .. } => "directory",
            Self::Http { .. } => "http",
        }
    }
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory { root } => f.debug_struct("Directory").field("root", root).finish(),
            Self::Http { endpoint, token } => f
                .debug_struct("Http")
                .field("endpoint", endpoint)
                .field("token", &token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Remote log routing recorded on the root span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteLogConfig {
    /// Log group the shipper writes into.
    pub log_group: String,
    /// Stream name inside the group.
    pub stream_name: String,
    /// Flush interval in seconds for the shipper.
    #[serde(default = "defaults::remote_log_send_interval")]
    pub send_interval: u64,
}

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    /// One JSON object per line.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default)]
    pub level: Option<String>,
    /// Output format; inferred from the build profile when omitted.
    #[serde(default)]
    pub format: Option<LogFormatSetting>,
}
