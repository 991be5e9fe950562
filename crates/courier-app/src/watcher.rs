//! Filesystem watcher feeding the quiet-period timer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use courier_fsops::enumerate_subtree;
use courier_telemetry::Metrics;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::scheduler::QuietPeriodTimer;

/// A path appeared in the watched tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationEvent {
    /// New path.
    pub path: PathBuf,
    /// Whether the path is a directory.
    pub is_dir: bool,
}

/// Creation events carried by a raw notify event.
///
/// Rename targets count as creations.
#[must_use]
pub fn creation_events(event: &Event) -> Vec<CreationEvent> {
    let probe = |path: &PathBuf| CreationEvent {
        is_dir: path.is_dir(),
        path: path.clone(),
    };
    match event.kind {
        EventKind::Create(CreateKind::File) => event
            .paths
            .iter()
            .map(|path| CreationEvent {
                path: path.clone(),
                is_dir: false,
            })
            .collect(),
        EventKind::Create(CreateKind::Folder) => event
            .paths
            .iter()
            .map(|path| CreationEvent {
                path: path.clone(),
                is_dir: true,
            })
            .collect(),
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
            event.paths.iter().map(probe).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(probe).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// The event itself plus a synthetic file creation for everything already
/// present under a newly created directory.
#[must_use]
pub fn expand_creation(event: CreationEvent) -> Vec<CreationEvent> {
    if !event.is_dir {
        return vec![event];
    }
    let nested = enumerate_subtree(&event.path);
    let mut expanded = Vec::with_capacity(nested.len() + 1);
    expanded.push(event);
    expanded.extend(nested.into_iter().map(|path| CreationEvent {
        path,
        is_dir: false,
    }));
    expanded
}

const FORWARDER_DRAIN: Duration = Duration::from_secs(2);

/// Running watcher and the task forwarding its events to the timer.
pub struct WatchHandle {
    watcher: RecommendedWatcher,
    forwarder: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop observing the tree and wait briefly for queued events to drain.
    pub async fn stop(self) {
        let Self { watcher, forwarder } = self;
        drop(watcher);
        let abort = forwarder.abort_handle();
        match timeout(FORWARDER_DRAIN, forwarder).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "watch forwarder join failed"),
            Err(_) => abort.abort(),
        }
    }
}

/// Watch `root` recursively; every creation re-arms `timer`.
///
/// # Errors
///
/// Returns [`AppError::Watch`] when the platform watcher cannot be created or
/// cannot observe `root`.
pub fn spawn_watcher(
    root: &Path,
    timer: QuietPeriodTimer,
    metrics: Metrics,
) -> AppResult<WatchHandle> {
    let (sender, receiver) = mpsc::unbounded_channel::<CreationEvent>();
    let handler = move |result: notify::Result<Event>| match result {
        Ok(event) => {
            for creation in creation_events(&event) {
                // Delivery is fire-and-forget; the next pass picks up anything missed.
                let _ = sender.send(creation);
            }
        }
        Err(err) => warn!(error = %err, "filesystem watch error"),
    };
    let mut watcher = notify::recommended_watcher(handler).map_err(|source| AppError::Watch {
        path: root.to_path_buf(),
        source,
    })?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|source| AppError::Watch {
            path: root.to_path_buf(),
            source,
        })?;
    info!(root = %root.display(), "watching for new files");

    let forwarder = tokio::spawn(forward(receiver, timer, metrics));
    Ok(WatchHandle { watcher, forwarder })
}

async fn forward(
    mut receiver: mpsc::UnboundedReceiver<CreationEvent>,
    timer: QuietPeriodTimer,
    metrics: Metrics,
) {
    while let Some(event) = receiver.recv().await {
        let expanded = if event.is_dir {
            let dir = event.path.clone();
            match tokio::task::spawn_blocking(move || expand_creation(event)).await {
                Ok(expanded) => expanded,
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "subtree enumeration failed");
                    continue;
                }
            }
        } else {
            vec![event]
        };
        for creation in expanded {
            debug!(
                path = %creation.path.display(),
                is_dir = creation.is_dir,
                "creation observed"
            );
            if timer.arm() {
                metrics.inc_debounce_reset();
            }
        }
    }
}
