//! Fallback values applied when the configuration document omits a field.

use std::path::PathBuf;

/// Configuration file read when `COURIER_CONFIG` is unset.
pub const CONFIG_FILE: &str = "config.json";
/// Reference snapshot written next to the working directory by default.
pub const SNAPSHOT_FILE: &str = "persist.json";
/// Quiet period before a batch pass runs, in seconds.
pub const QUIET_PERIOD_SECS: u64 = 10;
/// Default Postgres port.
pub const POSTGRES_PORT: u16 = 5432;
/// Interval, in seconds, at which an external shipper flushes remote logs.
pub const REMOTE_LOG_SEND_INTERVAL_SECS: u64 = 10;

pub(crate) fn snapshot_path() -> PathBuf {
    PathBuf::from(SNAPSHOT_FILE)
}

pub(crate) const fn quiet_period_secs() -> u64 {
    QUIET_PERIOD_SECS
}

pub(crate) const fn postgres_port() -> u16 {
    POSTGRES_PORT
}

pub(crate) const fn remote_log_send_interval() -> u64 {
    REMOTE_LOG_SEND_INTERVAL_SECS
}

pub(crate) const fn enabled() -> bool {
    true
}
