//! Quiet-period debouncer that gates batch passes.
//!
//! [`QuietPeriodTimer`] owns the only live deferred task. Every `arm`
//! cancels the previous task and starts a fresh countdown, so a burst of
//! filesystem events produces exactly one fire once the tree goes quiet.
//! Fires are delivered through the paired [`FireReceiver`]; a fire from a
//! task that was superseded before the receiver saw it is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    armed: bool,
    pending: Option<JoinHandle<()>>,
}

/// Cloneable handle for arming and cancelling the quiet-period countdown.
#[derive(Debug, Clone)]
pub struct QuietPeriodTimer {
    quiet: Duration,
    state: Arc<Mutex<TimerState>>,
    fires: mpsc::UnboundedSender<u64>,
}

/// Receives quiet-period expirations.
#[derive(Debug)]
pub struct FireReceiver {
    state: Arc<Mutex<TimerState>>,
    fires: mpsc::UnboundedReceiver<u64>,
}

/// Build a timer and the receiver its fires are delivered to.
#[must_use]
pub fn channel(quiet: Duration) -> (QuietPeriodTimer, FireReceiver) {
    let state = Arc::new(Mutex::new(TimerState::default()));
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        QuietPeriodTimer {
            quiet,
            state: Arc::clone(&state),
            fires: sender,
        },
        FireReceiver {
            state,
            fires: receiver,
        },
    )
}

fn lock(state: &Mutex<TimerState>) -> MutexGuard<'_, TimerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QuietPeriodTimer {
    /// Start the countdown, replacing any countdown already running.
    ///
    /// Returns `true` when a running countdown was reset. Must be called from
    /// within a Tokio runtime.
    pub fn arm(&self) -> bool {
        let mut state = lock(&self.state);
        let was_armed = state.armed;
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        state.armed = true;

        let generation = state.generation;
        let deadline = Instant::now() + self.quiet;
        let fires = self.fires.clone();
        state.pending = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            // Receiver gone means the loop has shut down.
            let _ = fires.send(generation);
        }));
        was_armed
    }

    /// Stop the countdown. Cancelling an idle or already-fired timer is a no-op.
    pub fn cancel(&self) {
        let mut state = lock(&self.state);
        if !state.armed {
            return;
        }
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        state.armed = false;
    }

    /// Whether a countdown is running and has not yet been consumed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        lock(&self.state).armed
    }

    /// Configured quiet period.
    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }
}

impl FireReceiver {
    /// Wait for the current countdown to expire, returning the timer to idle.
    ///
    /// Returns `None` once every timer handle has been dropped.
    pub async fn recv(&mut self) -> Option<()> {
        loop {
            let fired = self.fires.recv().await?;
            let mut state = lock(&self.state);
            if state.armed && state.generation == fired {
                state.armed = false;
                state.pending = None;
                return Some(());
            }
        }
    }
}
