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

//! Filesystem operations for the ingestion pipeline.
//!
//! Layout: `mover.rs` (parallel-path computation and collision-safe
//! relocation), `listing.rs` (watched-tree snapshots, subtree enumeration,
//! pruning of emptied directories), `error.rs` (structured errors).

pub mod error;
pub mod listing;
pub mod mover;

pub use error::{FsOpsError, FsOpsResult};
pub use listing::{enumerate_subtree, is_hidden, list_files, prune_emptied_dirs};
pub use mover::{DEFAULT_COLLISION_LIMIT, Mover, RelocateRequest, today};
