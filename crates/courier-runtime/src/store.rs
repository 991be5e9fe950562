//! Single-writer holder of the active [`ReferenceState`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use courier_core::ReferenceState;
use tracing::{info, warn};

use crate::error::RuntimeResult;
use crate::snapshot::{read_snapshot, write_snapshot};

/// Active destination set plus the snapshot file backing it.
///
/// Readers take an immutable [`Arc`] snapshot with [`current`](Self::current);
/// the resolver swaps in a whole new set with [`replace`](Self::replace).
/// Swaps are serialized internally, but a lookup-then-replace sequence is
/// only race-free while a single processing loop drives it.
#[derive(Debug)]
pub struct ReferenceStore {
    path: PathBuf,
    state: RwLock<Arc<ReferenceState>>,
    durable: AtomicBool,
}

impl ReferenceStore {
    /// Open the store, loading the snapshot at `path`.
    ///
    /// An absent or unreadable snapshot yields an empty state; the next
    /// successful resolution rewrites it.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match read_snapshot(&path) {
            Ok(state) => {
                info!(
                    path = %path.display(),
                    destinations = state.len(),
                    "reference snapshot loaded"
                );
                state
            }
            Err(err) if err.is_missing() => {
                info!(path = %path.display(), "no reference snapshot; starting empty");
                ReferenceState::empty()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "reference snapshot unreadable; starting empty"
                );
                ReferenceState::empty()
            }
        };
        Self::with_state(path, state)
    }

    /// Store seeded with `state`, treated as already durable.
    #[must_use]
    pub fn with_state(path: impl Into<PathBuf>, state: ReferenceState) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(Arc::new(state)),
            durable: AtomicBool::new(true),
        }
    }

    /// Immutable view of the active set.
    #[must_use]
    pub fn current(&self) -> Arc<ReferenceState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in `next` and persist it.
    ///
    /// The in-memory state is authoritative: it is replaced even when the
    /// write fails, and [`is_durable`](Self::is_durable) reports `false` until
    /// a later replacement persists.
    ///
    /// # Errors
    ///
    /// Returns the snapshot write failure.
    pub fn replace(&self, next: ReferenceState) -> RuntimeResult<()> {
        let next = Arc::new(next);
        {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::clone(&next);
        }
        match write_snapshot(&self.path, &next) {
            Ok(()) => {
                self.durable.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                self.durable.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Whether the on-disk snapshot matches the active set.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.durable.load(Ordering::Acquire)
    }

    /// Snapshot file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
