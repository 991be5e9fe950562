//! The watch loop: wait for the quiet period, run a pass, repeat.

use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::processor::FileProcessor;
use crate::scheduler::{FireReceiver, QuietPeriodTimer};

/// Sender half used to request shutdown.
pub type ShutdownSender = watch::Sender<bool>;
/// Receiver half observed by the loop.
pub type ShutdownReceiver = watch::Receiver<bool>;

/// Fresh shutdown channel in the running state.
#[must_use]
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// Run passes until shutdown is requested, returning the number of passes.
///
/// The timer is armed before every wait, so the tree is polled once per quiet
/// period even when no events arrive. A pass already running when shutdown is
/// requested completes before the loop exits.
pub async fn run_pipeline(
    processor: &FileProcessor,
    timer: &QuietPeriodTimer,
    mut fires: FireReceiver,
    mut shutdown: ShutdownReceiver,
) -> u64 {
    let mut passes = 0_u64;
    while !*shutdown.borrow_and_update() {
        timer.arm();
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            fired = fires.recv() => {
                if fired.is_none() {
                    debug!("timer closed");
                    break;
                }
                processor.run_pass().await;
                passes += 1;
            }
        }
    }
    timer.cancel();
    info!(passes, "watch loop stopped");
    passes
}

/// Resolve once shutdown has been requested or every sender is gone.
pub async fn shutdown_requested(shutdown: &mut ShutdownReceiver) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// [`run_pipeline`], running `on_shutdown` as soon as shutdown is requested.
///
/// `on_shutdown` completes before an in-flight pass is awaited, so event
/// sources can be detached while the last pass drains. It also runs when the
/// loop exits on its own.
pub async fn run_until_shutdown<F>(
    processor: &FileProcessor,
    timer: &QuietPeriodTimer,
    fires: FireReceiver,
    mut shutdown: ShutdownReceiver,
    on_shutdown: F,
) -> u64
where
    F: Future<Output = ()>,
{
    let pipeline = run_pipeline(processor, timer, fires, shutdown.clone());
    tokio::pin!(pipeline);
    let finished = tokio::select! {
        passes = &mut pipeline => Some(passes),
        () = shutdown_requested(&mut shutdown) => None,
    };
    on_shutdown.await;
    match finished {
        Some(passes) => passes,
        None => pipeline.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Resolver;
    use crate::scheduler;
    use anyhow::Result;
    use async_trait::async_trait;
    use courier_config::DirectoryLayout;
    use courier_core::{Destination, UploadReceipt, UploadRequest, Uploader};
    use courier_events::EventBus;
    use courier_runtime::ReferenceStore;
    use courier_telemetry::Metrics;
    use courier_test_support::fixtures::TempLayout;
    use courier_test_support::mocks::{RecordingUploader, StaticLookup, TextCodeDecoder};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::{sleep, timeout};

    type TestResult<T> = Result<T>;

    fn processor(layout: &TempLayout, events: &EventBus) -> TestResult<FileProcessor> {
        processor_with(layout, events, StaticLookup::new(), Arc::new(RecordingUploader::new()))
    }

    fn processor_with(
        layout: &TempLayout,
        events: &EventBus,
        lookup: StaticLookup,
        uploader: Arc<dyn Uploader>,
    ) -> TestResult<FileProcessor> {
        let metrics = Metrics::new()?;
        let store = Arc::new(ReferenceStore::open(layout.snapshot()));
        let resolver = Resolver::new(Arc::new(lookup), store, events.clone(), metrics.clone());
        Ok(FileProcessor::new(
            DirectoryLayout {
                unprocessed: layout.unprocessed().to_path_buf(),
                done: layout.done().to_path_buf(),
                error: layout.error().to_path_buf(),
            },
            resolver,
            Arc::new(TextCodeDecoder),
            uploader,
            events.clone(),
            metrics,
        )
        .with_date_subdirs(false))
    }

    /// Parks inside `upload` until released.
    #[derive(Default)]
    struct GatedUploader {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Uploader for GatedUploader {
        async fn upload(&self, request: UploadRequest<'_>) -> anyhow::Result<UploadReceipt> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(UploadReceipt {
                location: request.destination.destination_id().to_string(),
                bytes: 0,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loop_polls_after_each_quiet_period_and_stops_on_request() -> TestResult<()> {
        let layout = TempLayout::new()?;
        let events = EventBus::with_capacity(64);
        let processor = processor(&layout, &events)?;
        layout.drop_file("early.txt", "plain")?;

        let (timer, fires) = scheduler::channel(Duration::from_secs(10));
        let (stop, shutdown) = shutdown_channel();
        let mut stream = events.subscribe();
        let handle = {
            let timer = timer.clone();
            tokio::spawn(async move { run_pipeline(&processor, &timer, fires, shutdown).await })
        };

        loop {
            let Some(envelope) = stream.next().await else {
                anyhow::bail!("event bus closed");
            };
            if envelope.event.kind() == "batch_completed" {
                break;
            }
        }
        assert!(layout.done().join("early.txt").is_file());

        stop.send(true)?;
        let passes = handle.await?;
        assert!(passes >= 1);
        assert!(!timer.is_armed());
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_before_start_runs_no_pass() -> TestResult<()> {
        let layout = TempLayout::new()?;
        let events = EventBus::with_capacity(8);
        let processor = processor(&layout, &events)?;
        let (timer, fires) = scheduler::channel(Duration::from_secs(10));
        let (stop, shutdown) = shutdown_channel();
        stop.send(true)?;

        assert_eq!(run_pipeline(&processor, &timer, fires, shutdown).await, 0);
        assert!(!timer.is_armed());
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_during_a_pass_lets_the_pass_finish() -> TestResult<()> {
        let layout = TempLayout::new()?;
        let events = EventBus::with_capacity(64);
        let gate = Arc::new(GatedUploader::default());
        let lookup = StaticLookup::new().with("A", vec![Destination::new("7", "e", "s")]);
        let uploader: Arc<dyn Uploader> = gate.clone();
        let processor = processor_with(&layout, &events, lookup, uploader)?;
        layout.drop_file("label.txt", "code:A")?;

        let (timer, fires) = scheduler::channel(Duration::from_millis(20));
        let (stop, shutdown) = shutdown_channel();
        let detached = Arc::new(AtomicBool::new(false));
        let handle = {
            let timer = timer.clone();
            let detached = Arc::clone(&detached);
            tokio::spawn(async move {
                let on_shutdown = async move { detached.store(true, Ordering::SeqCst) };
                run_until_shutdown(&processor, &timer, fires, shutdown, on_shutdown).await
            })
        };

        timeout(Duration::from_secs(5), gate.entered.notified()).await?;
        stop.send(true)?;
        sleep(Duration::from_millis(50)).await;
        assert!(detached.load(Ordering::SeqCst));
        assert!(!handle.is_finished());
        assert!(layout.unprocessed().join("label.txt").is_file());

        gate.release.notify_one();
        let passes = timeout(Duration::from_secs(5), handle).await??;
        assert_eq!(passes, 1);
        assert!(layout.done().join("label.txt").is_file());
        assert!(!timer.is_armed());
        Ok(())
    }
}
