//! Wake primitives for the capture loops.
//!
//! Two distinct shapes, and the distinction matters:
//!
//! - `Gate` is level-triggered (manual reset). Once raised it stays raised,
//!   so the still loop can pass through it on every poll cycle until someone
//!   explicitly lowers it. Lowering pauses the loop at its next wait.
//! - `Pulse` is edge-triggered (auto reset). Each notification is consumed
//!   by exactly one wait, and notifications coalesce while one is pending.
//!   The persistence loop re-arms on it after every drain.
//!
//! Collapsing these into one primitive breaks the handoff protocol: the
//! still loop must keep polling across many ticks while armed, while the
//! video and persistence wakes are single-consumption events.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

// ----------------------------------------------------------------------------
// Gate: level-triggered, manual reset
// ----------------------------------------------------------------------------

pub struct Gate {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            raised: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Raise the gate and wake every waiter. Stays raised until `lower`.
    pub fn raise(&self) {
        let mut raised = self.raised.lock().unwrap_or_else(|e| e.into_inner());
        *raised = true;
        self.cond.notify_all();
    }

    pub fn lower(&self) {
        let mut raised = self.raised.lock().unwrap_or_else(|e| e.into_inner());
        *raised = false;
    }

    /// Block until the gate is raised. Does not consume the raised state.
    pub fn wait(&self) {
        let guard = self.raised.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = self
            .cond
            .wait_while(guard, |raised| !*raised)
            .unwrap_or_else(|e| e.into_inner());
    }

    #[cfg(test)]
    pub fn is_raised(&self) -> bool {
        *self.raised.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Pulse: edge-triggered, auto reset
// ----------------------------------------------------------------------------

/// Single-slot notification. `notify` while a notification is already
/// pending is a no-op, `wait` consumes exactly one notification.
#[derive(Clone)]
pub struct Pulse {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Pulse {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn notify(&self) {
        // full slot means a wake is already pending; coalesce
        let _ = self.tx.try_send(());
    }

    /// Block until notified. Returns false only if every sender is gone,
    /// which cannot happen while `self` is alive.
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

impl Default for Pulse {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
