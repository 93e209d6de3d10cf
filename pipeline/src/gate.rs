use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::media::LifecycleState;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("transition to {target:?} aborted: {reason}")]
    Aborted {
        target: LifecycleState,
        reason: String,
    },
    #[error("transition to {target:?} did not complete within {after:?}")]
    TimedOut {
        target: LifecycleState,
        after: Duration,
    },
}

#[derive(Debug)]
struct GateState {
    observed: LifecycleState,
    transition_ok: bool,
    failure: Option<String>,
}

/// Shared cell bridging asynchronous lifecycle notifications to blocking
/// waiters.
///
/// Every read and write happens under one mutex, and every write is
/// followed by `notify_all` while the lock is still held, so a waiter
/// either sees the update before it sleeps or is woken by it.
///
/// A wait cycle starts with [`StateGate::arm`]. Within a cycle a failure is
/// sticky: completions arriving after it are ignored.
#[derive(Debug)]
pub struct StateGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Default for StateGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                observed: LifecycleState::Unrealized,
                transition_ok: true,
                failure: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begins a new wait cycle. Must be called before the transition is
    /// requested, otherwise a fast completion could be wiped out.
    pub fn arm(&self) {
        let mut state = self.lock();
        state.transition_ok = true;
        state.failure = None;
    }

    /// Records that the pipeline reached `reached` and wakes all waiters.
    pub fn complete(&self, reached: LifecycleState) {
        let mut state = self.lock();
        if !state.transition_ok {
            warn!(
                reached = ?reached,
                "completion after failure in the same cycle, ignoring"
            );
            return;
        }
        debug!(from = ?state.observed, to = ?reached, "state gate advanced");
        state.observed = reached;
        self.changed.notify_all();
    }

    /// Marks the current cycle as failed and wakes all waiters.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.lock();
        state.transition_ok = false;
        if state.failure.is_none() {
            state.failure = Some(reason.into());
        }
        self.changed.notify_all();
    }

    pub fn observed(&self) -> LifecycleState {
        self.lock().observed
    }

    pub fn transition_ok(&self) -> bool {
        self.lock().transition_ok
    }
}

/// Blocks the calling thread on a [`StateGate`].
#[derive(Debug, Clone)]
pub struct StateWaiter {
    gate: Arc<StateGate>,
    timeout: Option<Duration>,
}

impl StateWaiter {
    pub fn new(gate: Arc<StateGate>, timeout: Option<Duration>) -> Self {
        Self { gate, timeout }
    }

    /// Waits until the gate observes `target` or the cycle fails.
    pub fn wait(&self, target: LifecycleState) -> Result<LifecycleState, WaitError> {
        let pending = |s: &mut GateState| s.observed != target && s.transition_ok;
        let mut state = self.gate.lock();

        match self.timeout {
            None => {
                state = self
                    .gate
                    .changed
                    .wait_while(state, pending)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while pending(&mut *state) {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(WaitError::TimedOut {
                            target,
                            after: timeout,
                        });
                    }
                    let (guard, _) = self
                        .gate
                        .changed
                        .wait_timeout_while(state, remaining, pending)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }

        if state.observed == target {
            Ok(target)
        } else {
            Err(WaitError::Aborted {
                target,
                reason: state
                    .failure
                    .clone()
                    .unwrap_or_else(|| "transition failed".into()),
            })
        }
    }

    /// Returns true if `target` was reached, false if the wait was aborted
    /// or timed out.
    pub fn wait_for_state(&self, target: LifecycleState) -> bool {
        self.wait(target).is_ok()
    }
}
