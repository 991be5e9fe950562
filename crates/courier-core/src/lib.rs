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

//! Routing domain types and the collaborator traits the ingestion pipeline
//! depends on.
//!
//! Layout: `model/` (destinations, reference state, outcomes), `service/`
//! (decoder, lookup, and upload traits implemented by adapters).

pub mod model;
pub mod service;

pub use model::{
    Destination, Disposition, ReferenceState, RelocationOutcome, UploadProgress, UploadReceipt,
};
pub use service::{CodeDecoder, DestinationLookup, UploadRequest, Uploader};
