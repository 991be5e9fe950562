//! Root span carried for the lifetime of the process.

use tracing::{Span, field, span::Entered};

use crate::init::build_sha;

/// Guard that keeps the application-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the application-level tracing span for the lifetime of the guard.
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "app",
            mode = %mode,
            build_sha = %build_sha(),
            log_group = field::Empty,
            log_stream = field::Empty,
        )));
        let guard = span.enter();
        Self { _guard: guard }
    }
}

/// Record the remote log routing on the active root span.
pub fn record_remote_log(log_group: &str, stream_name: &str) {
    let span = Span::current();
    span.record("log_group", field::display(log_group));
    span.record("log_stream", field::display(stream_name));
}
