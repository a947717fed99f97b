//! Debounced follow-up scheduling.
//!
//! Conversations coalesce rapid message bursts into one delayed action. The
//! schedule is an explicit three-state machine so callers can observe it:
//! `Idle` (nothing scheduled), `Pending` (armed, with a deadline), and
//! `Firing` (the action is running). Re-arming while idle or pending moves
//! the deadline; re-arming while firing schedules a fresh run that waits for
//! the current one to finish.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

/// How often a timer that expired mid-fire re-checks for the slot.
const BUSY_RETRY: Duration = Duration::from_millis(5);

/// Observable schedule state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DebouncePhase {
    /// No action scheduled or running.
    Idle,
    /// An action is armed and will fire at the deadline unless re-armed.
    Pending(Instant),
    /// The action is currently running.
    Firing,
}

#[derive(Debug, Default)]
struct State {
    /// Bumped on every poke and cancel; a timer whose epoch is stale was
    /// superseded and must not fire.
    epoch: u64,
    armed: bool,
    firing: bool,
    deadline: Option<Instant>,
}

/// A restartable delay timer guarding a single async action slot.
#[derive(Clone)]
pub struct Debounce {
    delay: Duration,
    state: Arc<Mutex<State>>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the timer with a fresh action.
    ///
    /// Any previously pending action is superseded and will never run. The
    /// new action runs after the full delay; if an older action is still
    /// firing at that point, the run waits for it rather than overlapping.
    ///
    /// Must be called from within a tokio runtime.
    pub fn poke<F>(&self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + self.delay;
        let epoch = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.epoch += 1;
            state.armed = true;
            state.deadline = Some(deadline);
            state.epoch
        };

        let shared = Arc::clone(&self.state);
        let delay = self.delay;
        tokio::spawn(async move {
            sleep(delay).await;
            loop {
                {
                    let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                    if state.epoch != epoch {
                        trace!(epoch, "debounce timer superseded");
                        return;
                    }
                    if !state.firing {
                        state.armed = false;
                        state.firing = true;
                        state.deadline = None;
                        break;
                    }
                }
                sleep(BUSY_RETRY).await;
            }

            action.await;

            let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
            state.firing = false;
        });
    }

    /// Drop any pending action without firing it. A run already in flight
    /// is not interrupted.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.epoch += 1;
        state.armed = false;
        state.deadline = None;
    }

    pub fn phase(&self) -> DebouncePhase {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.firing {
            DebouncePhase::Firing
        } else if state.armed {
            match state.deadline {
                Some(deadline) => DebouncePhase::Pending(deadline),
                None => DebouncePhase::Idle,
            }
        } else {
            DebouncePhase::Idle
        }
    }
}
