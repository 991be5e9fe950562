//! Prometheus-backed pipeline counters and snapshot helpers.

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed counters shared across the pipeline.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    batch_passes_total: IntCounter,
    files_processed_total: IntCounterVec,
    resolutions_total: IntCounterVec,
    uploads_total: IntCounterVec,
    snapshot_writes_total: IntCounterVec,
    debounce_resets_total: IntCounter,
    active_destinations: IntGauge,
    last_batch_duration_ms: IntGauge,
}

/// Point-in-time summary logged at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Batch passes executed.
    pub batch_passes_total: u64,
    /// Files archived under the done root.
    pub files_done_total: u64,
    /// Files archived under the error root.
    pub files_error_total: u64,
    /// Files that could not be relocated.
    pub files_stranded_total: u64,
    /// Resolutions that replaced the active set.
    pub resolutions_replaced_total: u64,
    /// Resolutions that found no rows.
    pub resolutions_no_match_total: u64,
    /// Resolutions that failed at the lookup store.
    pub resolutions_failed_total: u64,
    /// Successful uploads.
    pub uploads_ok_total: u64,
    /// Failed uploads.
    pub uploads_failed_total: u64,
    /// Snapshot writes that failed.
    pub snapshot_write_failures_total: u64,
    /// Timer re-arms caused by filesystem activity.
    pub debounce_resets_total: u64,
    /// Destinations currently active.
    pub active_destinations: i64,
    /// Duration of the most recent pass, in milliseconds.
    pub last_batch_duration_ms: i64,
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

impl Metrics {
    /// Construct the standard pipeline collectors.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built.
    pub fn new() -> Result<Self> {
        let batch_passes_total = counter("batch_passes_total", "Batch passes executed")?;
        let files_processed_total = counter_vec(
            "files_processed_total",
            "Files that reached a terminal disposition",
            &["disposition"],
        )?;
        let resolutions_total = counter_vec(
            "resolutions_total",
            "Code resolutions by outcome",
            &["outcome"],
        )?;
        let uploads_total = counter_vec("uploads_total", "Uploads by status", &["status"])?;
        let snapshot_writes_total = counter_vec(
            "snapshot_writes_total",
            "Reference snapshot writes by status",
            &["status"],
        )?;
        let debounce_resets_total = counter(
            "debounce_resets_total",
            "Quiet-period timer re-arms caused by filesystem activity",
        )?;
        let active_destinations = gauge("active_destinations", "Destinations currently active")?;
        let last_batch_duration_ms = gauge(
            "last_batch_duration_ms",
            "Duration of the most recent batch pass (ms)",
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                batch_passes_total,
                files_processed_total,
                resolutions_total,
                uploads_total,
                snapshot_writes_total,
                debounce_resets_total,
                active_destinations,
                last_batch_duration_ms,
            }),
        })
    }

    /// Record a completed batch pass and its duration.
    pub fn observe_batch(&self, duration: Duration) {
        self.inner.batch_passes_total.inc();
        self.inner
            .last_batch_duration_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Increment the terminal disposition counter (`done`, `error`, `stranded`).
    pub fn inc_file(&self, disposition: &str) {
        self.inner
            .files_processed_total
            .with_label_values(&[disposition])
            .inc();
    }

    /// Increment the resolution counter (`replaced`, `no_match`, `failed`).
    pub fn inc_resolution(&self, outcome: &str) {
        self.inner
            .resolutions_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Increment the upload counter (`ok`, `failed`).
    pub fn inc_upload(&self, status: &str) {
        self.inner.uploads_total.with_label_values(&[status]).inc();
    }

    /// Increment the snapshot write counter (`ok`, `failed`).
    pub fn inc_snapshot_write(&self, status: &str) {
        self.inner
            .snapshot_writes_total
            .with_label_values(&[status])
            .inc();
    }

    /// Count a timer re-arm.
    pub fn inc_debounce_reset(&self) {
        self.inner.debounce_resets_total.inc();
    }

    /// Set the active destination gauge.
    pub fn set_active_destinations(&self, count: usize) {
        self.inner
            .active_destinations
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Take a point-in-time snapshot of the counters and gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        let files = |label: &str| inner.files_processed_total.with_label_values(&[label]).get();
        let resolutions = |label: &str| inner.resolutions_total.with_label_values(&[label]).get();
        let uploads = |label: &str| inner.uploads_total.with_label_values(&[label]).get();
        MetricsSnapshot {
            batch_passes_total: inner.batch_passes_total.get(),
            files_done_total: files("done"),
            files_error_total: files("error"),
            files_stranded_total: files("stranded"),
            resolutions_replaced_total: resolutions("replaced"),
            resolutions_no_match_total: resolutions("no_match"),
            resolutions_failed_total: resolutions("failed"),
            uploads_ok_total: uploads("ok"),
            uploads_failed_total: uploads("failed"),
            snapshot_write_failures_total: inner
                .snapshot_writes_total
                .with_label_values(&["failed"])
                .get(),
            debounce_resets_total: inner.debounce_resets_total.get(),
            active_destinations: inner.active_destinations.get(),
            last_batch_duration_ms: inner.last_batch_duration_ms.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        metrics.observe_batch(Duration::from_millis(250));
        metrics.inc_file("done");
        metrics.inc_file("done");
        metrics.inc_file("error");
        metrics.inc_resolution("replaced");
        metrics.inc_resolution("no_match");
        metrics.inc_upload("ok");
        metrics.inc_upload("failed");
        metrics.inc_snapshot_write("failed");
        metrics.inc_debounce_reset();
        metrics.set_active_destinations(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batch_passes_total, 1);
        assert_eq!(snapshot.files_done_total, 2);
        assert_eq!(snapshot.files_error_total, 1);
        assert_eq!(snapshot.files_stranded_total, 0);
        assert_eq!(snapshot.resolutions_replaced_total, 1);
        assert_eq!(snapshot.resolutions_no_match_total, 1);
        assert_eq!(snapshot.uploads_failed_total, 1);
        assert_eq!(snapshot.snapshot_write_failures_total, 1);
        assert_eq!(snapshot.debounce_resets_total, 1);
        assert_eq!(snapshot.active_destinations, 3);
        assert_eq!(snapshot.last_batch_duration_ms, 250);

        let json = serde_json::to_value(&snapshot)?;
        assert_eq!(json["files_done_total"], 2);
        Ok(())
    }
}
