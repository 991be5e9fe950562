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

//! Courier watch service wiring.
//!
//! Layout: `bootstrap.rs` (service wiring), `pipeline.rs` (watch loop),
//! `processor.rs` (batch passes), `resolver.rs` (reference updates),
//! `scheduler.rs` (quiet-period timer), `watcher.rs` (filesystem events),
//! `decode.rs` (QR decoding), `upload.rs` (upload backends).

/// Application bootstrap and signal handling.
pub mod bootstrap;
/// QR code decoding.
pub mod decode;
/// Application error types.
pub mod error;
/// Watch loop driving batch passes.
pub mod pipeline;
/// Per-file processing passes.
pub mod processor;
/// Active destination updates.
pub mod resolver;
/// Quiet-period debouncing.
pub mod scheduler;
/// Upload backends.
pub mod upload;
/// Filesystem creation events.
pub mod watcher;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
