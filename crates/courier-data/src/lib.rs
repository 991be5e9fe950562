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

//! Data access for the relational lookup store.
//! Layout: error.rs (`DataError`), lookup.rs (connection settings and the
//! `DestinationLookup` implementation).

pub mod error;
pub mod lookup;

pub use error::{DataError, Result};
pub use lookup::{ConnectSettings, PgDestinationLookup};
