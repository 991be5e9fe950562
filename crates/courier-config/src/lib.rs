#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(
    missing_docs,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]

//! File-backed configuration for the ingestion daemon.
//!
//! Layout: `model.rs` (typed configuration sections), `loader.rs` (reading the
//! JSON document), `validate.rs` (startup precondition checks), `defaults.rs`
//! (fallback values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, config_path_from_env, load_from_env, load_from_path};
pub use model::{
    AppConfig, DirectoryLayout, LogFormatSetting, LoggingSettings, PostgresConfig,
    RemoteLogConfig, UploadConfig,
};
pub use validate::{prepare_layout, validate};
