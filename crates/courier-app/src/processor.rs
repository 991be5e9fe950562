//! Batch passes over the watched tree.
//!
//! Each file walks decode, resolve, route and archive in that order and ends
//! the pass with exactly one terminal outcome.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use courier_config::DirectoryLayout;
use courier_core::{CodeDecoder, Disposition, RelocationOutcome, UploadRequest, Uploader};
use courier_events::{Event, EventBus};
use courier_fsops::{
    FsOpsError, FsOpsResult, Mover, RelocateRequest, list_files, prune_emptied_dirs, today,
};
use courier_telemetry::Metrics;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::resolver::Resolver;

/// Terminal outcome of one file in a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// File was relocated into the done or error root.
    Archived(RelocationOutcome),
    /// Every relocation attempt failed; the file is still in the watched tree.
    Stranded {
        /// Path of the file.
        path: PathBuf,
        /// Last relocation failure.
        error: String,
    },
}

impl FileOutcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Archived(outcome) => outcome.disposition.as_str(),
            Self::Stranded { .. } => "stranded",
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Identifier carried on the pass span and events.
    pub batch_id: Uuid,
    /// Outcomes in processing order.
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    fn count(&self, disposition: Disposition) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| {
                matches!(
                    outcome,
                    FileOutcome::Archived(archived) if archived.disposition == disposition
                )
            })
            .count()
    }

    /// Files archived under the done root.
    #[must_use]
    pub fn done(&self) -> usize {
        self.count(Disposition::Done)
    }

    /// Files archived under the error root.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(Disposition::Error)
    }

    /// Files left in place.
    #[must_use]
    pub fn stranded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, FileOutcome::Stranded { .. }))
            .count()
    }
}

/// Runs batch passes. Only one pass may run at a time; the pipeline loop
/// guarantees this by awaiting each pass before waiting for the next fire.
#[derive(Clone)]
pub struct FileProcessor {
    layout: DirectoryLayout,
    date_subdirs: bool,
    mover: Mover,
    decoder: Arc<dyn CodeDecoder>,
    resolver: Resolver,
    uploader: Arc<dyn Uploader>,
    events: EventBus,
    metrics: Metrics,
}

impl FileProcessor {
    /// Processor over prepared roots with date partitioning enabled.
    #[must_use]
    pub fn new(
        layout: DirectoryLayout,
        resolver: Resolver,
        decoder: Arc<dyn CodeDecoder>,
        uploader: Arc<dyn Uploader>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            layout,
            date_subdirs: true,
            mover: Mover::new(),
            decoder,
            resolver,
            uploader,
            events,
            metrics,
        }
    }

    /// Toggle the `YYYY-MM-DD` folder under each archive root.
    #[must_use]
    pub fn with_date_subdirs(mut self, enabled: bool) -> Self {
        self.date_subdirs = enabled;
        self
    }

    /// Replace the relocation strategy.
    #[must_use]
    pub fn with_mover(mut self, mover: Mover) -> Self {
        self.mover = mover;
        self
    }

    /// Process every visible file currently in the watched tree.
    pub async fn run_pass(&self) -> BatchReport {
        let batch_id = Uuid::new_v4();
        self.pass(batch_id)
            .instrument(info_span!("batch", %batch_id))
            .await
    }

    async fn pass(&self, batch_id: Uuid) -> BatchReport {
        let started = Instant::now();
        let root = self.layout.unprocessed.clone();
        let listing_root = root.clone();
        let files = match blocking("list.join", &root, move || list_files(&listing_root)).await {
            Ok(files) => files,
            Err(err) => {
                error!(root = %root.display(), error = %err, "failed to list watched tree");
                Vec::new()
            }
        };
        self.events.publish(Event::BatchStarted {
            batch_id,
            files: files.len(),
        });

        let mut outcomes = Vec::with_capacity(files.len());
        for path in files {
            let span = info_span!("file", path = %path.display());
            let outcome = self.process_file(batch_id, path).instrument(span).await;
            self.metrics.inc_file(outcome.label());
            outcomes.push(outcome);
        }

        let vacated: Vec<PathBuf> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                FileOutcome::Archived(archived) => Some(archived.original_path.clone()),
                FileOutcome::Stranded { .. } => None,
            })
            .collect();
        if !vacated.is_empty() {
            let prune_root = root.clone();
            let prune = move || prune_emptied_dirs(&prune_root, &vacated);
            match blocking("prune.join", &root, prune).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "pruned emptied directories"),
                Err(err) => warn!(error = %err, "failed to prune watched tree"),
            }
        }

        let report = BatchReport { batch_id, outcomes };
        self.metrics.observe_batch(started.elapsed());
        self.events.publish(Event::BatchCompleted {
            batch_id,
            done: report.done(),
            error: report.errors(),
            stranded: report.stranded(),
        });
        if !report.outcomes.is_empty() {
            info!(
                done = report.done(),
                error = report.errors(),
                stranded = report.stranded(),
                "batch pass finished"
            );
        }
        report
    }

    async fn process_file(&self, batch_id: Uuid, path: PathBuf) -> FileOutcome {
        let disposition = match self.route(&path).await {
            Ok(()) => Disposition::Done,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "routing failed");
                Disposition::Error
            }
        };
        let outcome = self.archive(path, disposition).await;
        if let FileOutcome::Archived(archived) = &outcome {
            self.events.publish(Event::FileArchived {
                batch_id,
                original_path: archived.original_path.display().to_string(),
                final_path: archived.final_path.display().to_string(),
                disposition: archived.disposition,
            });
        }
        outcome
    }

    /// Decode, resolve every code, then forward to the active destinations.
    async fn route(&self, path: &Path) -> Result<()> {
        let codes = match self.decode(path).await {
            Ok(codes) => codes,
            Err(err) => {
                warn!(
                    error = %format!("{err:#}"),
                    "decode failed; routing with active destinations"
                );
                Vec::new()
            }
        };
        for code in &codes {
            if let Err(err) = self.resolver.update(code).await {
                warn!(code = %code, error = %format!("{err:#}"), "code resolution failed");
            }
        }

        let state = self.resolver.store().current();
        if state.is_empty() {
            debug!("no active destinations");
        }
        for destination in state.iter() {
            let request = UploadRequest { path, destination };
            match self.uploader.upload(request).await {
                Ok(receipt) => {
                    self.metrics.inc_upload("ok");
                    debug!(
                        destination = %destination,
                        location = %receipt.location,
                        bytes = receipt.bytes,
                        "uploaded"
                    );
                }
                Err(err) => {
                    self.metrics.inc_upload("failed");
                    return Err(err).with_context(|| format!("upload to {destination} failed"));
                }
            }
        }
        Ok(())
    }

    async fn decode(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let decoder = Arc::clone(&self.decoder);
        let codes = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .context("decoder task failed")??;
        debug!(codes = codes.len(), "decoded");
        Ok(codes)
    }

    /// Relocate into the intended root, falling back to the error root and
    /// then to a forced unique name in the error root.
    async fn archive(&self, source: PathBuf, intended: Disposition) -> FileOutcome {
        let mut attempt = self
            .relocate(&source, intended, false)
            .await
            .map(|path| (path, intended));

        if intended == Disposition::Done {
            if let Err(err) = &attempt {
                warn!(error = %err, "archive to done failed; trying error root");
                attempt = self
                    .relocate(&source, Disposition::Error, false)
                    .await
                    .map(|path| (path, Disposition::Error));
            }
        }

        if let Err(err) = &attempt {
            if err.is_collision_exhausted() {
                warn!(error = %err, "error root names exhausted; forcing unique name");
                attempt = self
                    .relocate(&source, Disposition::Error, true)
                    .await
                    .map(|path| (path, Disposition::Error));
            }
        }

        match attempt {
            Ok((final_path, disposition)) => {
                info!(
                    disposition = %disposition,
                    final_path = %final_path.display(),
                    "file archived"
                );
                FileOutcome::Archived(RelocationOutcome {
                    original_path: source,
                    final_path,
                    disposition,
                })
            }
            Err(err) => {
                error!(error = %err, "file could not be relocated; leaving in place");
                FileOutcome::Stranded {
                    path: source,
                    error: err.to_string(),
                }
            }
        }
    }

    async fn relocate(
        &self,
        source: &Path,
        disposition: Disposition,
        forced: bool,
    ) -> FsOpsResult<PathBuf> {
        let root = match disposition {
            Disposition::Done => self.layout.done.clone(),
            Disposition::Error => self.layout.error.clone(),
        };
        let base = self.layout.unprocessed.clone();
        let owned = source.to_path_buf();
        let date_subdir = self.date_subdirs.then(today);
        let mover = self.mover;
        blocking("relocate.join", source, move || {
            let request = RelocateRequest {
                source: &owned,
                destination_root: &root,
                preserve_relative_to: &base,
                date_subdir,
            };
            if forced {
                Mover::relocate_forced(&request)
            } else {
                mover.relocate(&request)
            }
        })
        .await
    }
}

/// Run filesystem work off the async workers.
async fn blocking<T, F>(operation: &'static str, path: &Path, work: F) -> FsOpsResult<T>
where
    F: FnOnce() -> FsOpsResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(err) => Err(FsOpsError::Io {
            operation,
            path: path.to_path_buf(),
            source: io::Error::other(err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Destination;
    use courier_runtime::ReferenceStore;
    use courier_test_support::fixtures::{TempLayout, files_under};
    use courier_test_support::mocks::{RecordingUploader, StaticLookup, TextCodeDecoder};
    use std::fs;

    type TestResult<T> = Result<T>;

    struct Harness {
        layout: TempLayout,
        processor: FileProcessor,
        uploader: RecordingUploader,
        events: EventBus,
    }

    fn harness(lookup: StaticLookup, uploader: RecordingUploader) -> TestResult<Harness> {
        let layout = TempLayout::new()?;
        let events = EventBus::with_capacity(256);
        let metrics = Metrics::new()?;
        let store = Arc::new(ReferenceStore::open(layout.snapshot()));
        let resolver = Resolver::new(Arc::new(lookup), store, events.clone(), metrics.clone());
        let roots = DirectoryLayout {
            unprocessed: layout.unprocessed().to_path_buf(),
            done: layout.done().to_path_buf(),
            error: layout.error().to_path_buf(),
        };
        let processor = FileProcessor::new(
            roots,
            resolver,
            Arc::new(TextCodeDecoder),
            Arc::new(uploader.clone()),
            events.clone(),
            metrics,
        );
        Ok(Harness {
            layout,
            processor,
            uploader,
            events,
        })
    }

    fn dated(name: &str) -> PathBuf {
        PathBuf::from(today().format("%Y-%m-%d").to_string()).join(name)
    }

    #[tokio::test]
    async fn every_file_gets_exactly_one_disposition() -> TestResult<()> {
        let lookup = StaticLookup::new().with("A", vec![Destination::new("10", "e", "north")]);
        let h = harness(lookup, RecordingUploader::new())?;
        h.layout.drop_file("a.txt", "code:A\n")?;
        h.layout.drop_file("b.txt", "plain")?;
        h.layout.drop_file("tray/c.txt", "plain")?;
        h.layout.drop_file(".hidden", "ignored")?;

        let report = h.processor.run_pass().await;
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.done(), 3);
        assert_eq!(report.errors() + report.stranded(), 0);

        assert_eq!(
            files_under(h.layout.done())?,
            vec![dated("a.txt"), dated("b.txt"), dated("tray/c.txt")]
        );
        assert_eq!(files_under(h.layout.unprocessed())?, vec![PathBuf::from(".hidden")]);
        assert!(!h.layout.unprocessed().join("tray").exists());

        let destinations: Vec<_> = h
            .uploader
            .uploads()
            .into_iter()
            .map(|upload| upload.destination_id)
            .collect();
        assert_eq!(destinations, vec!["10", "10", "10"]);
        Ok(())
    }

    #[tokio::test]
    async fn pass_keeps_empty_folders_it_did_not_empty() -> TestResult<()> {
        let h = harness(StaticLookup::new(), RecordingUploader::new())?;
        let waiting = h.layout.unprocessed().join("bench-7-drop");
        fs::create_dir_all(&waiting)?;
        h.layout.drop_file("unrelated.jpg", "plain")?;

        let report = h.processor.run_pass().await;
        assert_eq!(report.done(), 1);
        assert!(waiting.is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_file_with_no_destinations_goes_to_done() -> TestResult<()> {
        let h = harness(StaticLookup::new(), RecordingUploader::new())?;
        h.layout.drop_file("img.jpg", [0xff_u8, 0xd8, 0xff, 0x00])?;

        let report = h.processor.run_pass().await;
        assert_eq!(report.done(), 1);
        assert!(h.layout.done().join(dated("img.jpg")).is_file());
        assert!(h.uploader.uploads().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn upload_failure_archives_to_error() -> TestResult<()> {
        let lookup = StaticLookup::new().with(
            "A",
            vec![Destination::new("ok", "e", "s"), Destination::new("down", "e", "s")],
        );
        let h = harness(lookup, RecordingUploader::new().failing_for("down"))?;
        h.layout.drop_file("x.txt", "code:A")?;

        let report = h.processor.run_pass().await;
        assert_eq!(report.errors(), 1);
        assert!(h.layout.error().join(dated("x.txt")).is_file());
        assert!(files_under(h.layout.done())?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn repeated_names_get_numbered_suffixes() -> TestResult<()> {
        let h = harness(StaticLookup::new(), RecordingUploader::new())?;
        for _ in 0..3 {
            h.layout.drop_file("img.jpg", "plain")?;
            h.processor.run_pass().await;
        }
        assert_eq!(
            files_under(h.layout.done())?,
            vec![dated("img (1).jpg"), dated("img (2).jpg"), dated("img.jpg")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_roots_fall_back_to_forced_name() -> TestResult<()> {
        let h = harness(StaticLookup::new(), RecordingUploader::new())?;
        let processor = h.processor.clone().with_mover(Mover::with_collision_limit(1));
        for root in [h.layout.done(), h.layout.error()] {
            let dir = root.join(dated(""));
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("f.txt"), "old")?;
            fs::write(dir.join("f (1).txt"), "old")?;
        }
        h.layout.drop_file("f.txt", "plain")?;

        let report = processor.run_pass().await;
        assert_eq!(report.errors(), 1);
        let archived = files_under(h.layout.error())?;
        assert_eq!(archived.len(), 3);
        assert!(archived.iter().any(|path| {
            let name = path.to_string_lossy();
            name.contains("f (") && !name.ends_with("f (1).txt")
        }));
        Ok(())
    }

    #[tokio::test]
    async fn pass_publishes_lifecycle_events() -> TestResult<()> {
        let h = harness(StaticLookup::new(), RecordingUploader::new())?;
        let mut stream = h.events.subscribe();
        h.layout.drop_file("one.txt", "plain")?;
        h.processor.with_date_subdirs(false).run_pass().await;

        assert!(h.layout.done().join("one.txt").is_file());
        let kinds: Vec<_> = stream
            .drain_ready()
            .into_iter()
            .map(|envelope| envelope.event.kind())
            .collect();
        assert_eq!(kinds, vec!["batch_started", "file_archived", "batch_completed"]);
        Ok(())
    }
}
