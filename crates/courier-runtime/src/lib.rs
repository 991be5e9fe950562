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
#![allow(clippy::module_name_repetitions)]

//! Process-wide routing reference state and its durable snapshot.

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::{RuntimeError, RuntimeResult};
pub use snapshot::{SnapshotDocument, read_snapshot, write_snapshot};
pub use store::ReferenceStore;
