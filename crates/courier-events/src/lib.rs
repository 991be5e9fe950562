#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links)]
#![warn(missing_docs, unreachable_pub, clippy::all, clippy::pedantic)]

//! Event bus for the ingestion pipeline.
//!
//! The bus provides a typed event enum and sequential identifiers. Internally
//! it uses `tokio::broadcast` with a bounded buffer; when the channel
//! overflows the oldest events are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use courier_core::Disposition;
use tokio::sync::broadcast::{self, Receiver, Sender};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the pipeline.
pub type EventId = u64;

/// Default broadcast buffer size.
const DEFAULT_CAPACITY: usize = 1_024;

/// Typed pipeline events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A batch pass took its snapshot of the watched tree.
    BatchStarted {
        /// Identifier of the pass.
        batch_id: Uuid,
        /// Number of files in the snapshot.
        files: usize,
    },
    /// A file reached its terminal disposition.
    FileArchived {
        /// Identifier of the pass that touched the file.
        batch_id: Uuid,
        /// Path at discovery time.
        original_path: String,
        /// Path after relocation.
        final_path: String,
        /// Done or error.
        disposition: Disposition,
    },
    /// The active destination set was replaced after resolving a code.
    ReferenceReplaced {
        /// Code that produced the new set.
        code: String,
        /// Number of destinations now active.
        destinations: usize,
        /// Whether the snapshot write succeeded.
        persisted: bool,
    },
    /// A code could not be resolved; the active set is unchanged.
    ResolutionFailed {
        /// Code that failed to resolve.
        code: String,
        /// Failure description.
        message: String,
    },
    /// The reference snapshot could not be written to disk.
    SnapshotPersistFailed {
        /// Failure description.
        message: String,
    },
    /// A batch pass finished.
    BatchCompleted {
        /// Identifier of the pass.
        batch_id: Uuid,
        /// Files archived under the done root.
        done: usize,
        /// Files archived under the error root.
        error: usize,
        /// Files that could not be relocated at all.
        stranded: usize,
    },
    /// Set of degraded components changed.
    HealthChanged {
        /// Components currently degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BatchStarted { .. } => "batch_started",
            Self::FileArchived { .. } => "file_archived",
            Self::ReferenceReplaced { .. } => "reference_replaced",
            Self::ResolutionFailed { .. } => "resolution_failed",
            Self::SnapshotPersistFailed { .. } => "snapshot_persist_failed",
            Self::BatchCompleted { .. } => "batch_completed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Construct a bus with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Publish an event, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        // No live subscribers is not an error.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Live view of the bus for one subscriber.
pub struct EventStream {
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, skipping over lagged gaps.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain whatever is already available without waiting.
    pub fn drain_ready(&mut self) -> Vec<EventEnvelope> {
        let mut ready = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => ready.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        ready
    }
}
