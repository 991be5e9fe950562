//! Replaces the active destination set from decoded codes.

use std::sync::Arc;

use anyhow::{Context, Result};
use courier_core::{DestinationLookup, ReferenceState};
use courier_events::{Event, EventBus};
use courier_runtime::ReferenceStore;
use courier_telemetry::Metrics;
use tracing::{info, warn};

/// Component name reported while the snapshot is not durable.
const SNAPSHOT_COMPONENT: &str = "reference_snapshot";

/// Result of resolving one code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The active set was replaced.
    Replaced {
        /// Destinations now active.
        destinations: usize,
        /// Whether the snapshot write succeeded.
        persisted: bool,
    },
    /// The lookup returned no rows; the active set is unchanged.
    NoMatch,
}

/// Single writer of the [`ReferenceStore`].
#[derive(Clone)]
pub struct Resolver {
    lookup: Arc<dyn DestinationLookup>,
    store: Arc<ReferenceStore>,
    events: EventBus,
    metrics: Metrics,
}

impl Resolver {
    /// Build a resolver over `lookup` writing into `store`.
    #[must_use]
    pub fn new(
        lookup: Arc<dyn DestinationLookup>,
        store: Arc<ReferenceStore>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            lookup,
            store,
            events,
            metrics,
        }
    }

    /// Store holding the active set.
    #[must_use]
    pub fn store(&self) -> &Arc<ReferenceStore> {
        &self.store
    }

    /// Look `code` up and, when rows come back, replace the active set with
    /// exactly those rows.
    ///
    /// A snapshot write failure still commits the new set in memory; it is
    /// reported through `persisted: false` and a `SnapshotPersistFailed` event.
    ///
    /// # Errors
    ///
    /// Returns the lookup failure; the active set is left unchanged.
    pub async fn update(&self, code: &str) -> Result<Resolution> {
        let rows = match self.lookup.lookup(code).await {
            Ok(rows) => rows,
            Err(err) => {
                self.metrics.inc_resolution("failed");
                self.events.publish(Event::ResolutionFailed {
                    code: code.to_string(),
                    message: format!("{err:#}"),
                });
                return Err(err).context("destination lookup failed");
            }
        };

        if rows.is_empty() {
            self.metrics.inc_resolution("no_match");
            info!(code, "code matched no destinations; keeping active set");
            return Ok(Resolution::NoMatch);
        }

        let next = ReferenceState::new(rows);
        let destinations = next.len();
        let was_durable = self.store.is_durable();
        let persisted = match self.store.replace(next) {
            Ok(()) => {
                self.metrics.inc_snapshot_write("ok");
                if !was_durable {
                    self.events.publish(Event::HealthChanged {
                        degraded: Vec::new(),
                    });
                }
                true
            }
            Err(err) => {
                self.metrics.inc_snapshot_write("failed");
                warn!(
                    code,
                    path = %self.store.path().display(),
                    error = %err,
                    "reference snapshot write failed; in-memory set stays active"
                );
                self.events.publish(Event::SnapshotPersistFailed {
                    message: err.to_string(),
                });
                if was_durable {
                    self.events.publish(Event::HealthChanged {
                        degraded: vec![SNAPSHOT_COMPONENT.to_string()],
                    });
                }
                false
            }
        };

        self.metrics.inc_resolution("replaced");
        self.metrics.set_active_destinations(destinations);
        self.events.publish(Event::ReferenceReplaced {
            code: code.to_string(),
            destinations,
            persisted,
        });
        info!(code, destinations, persisted, "active destinations replaced");
        Ok(Resolution::Replaced {
            destinations,
            persisted,
        })
    }
}
