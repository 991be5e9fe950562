#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, missing_docs)]

//! Binary entrypoint for the courier watch service.

use courier_app::{AppResult, run_app};

/// Runs the watch service until a termination signal arrives.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
