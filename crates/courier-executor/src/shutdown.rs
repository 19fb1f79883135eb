//! Shutdown signalling shared by the admission path and the workers.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

use crate::admission::AdmissionGate;

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const STOPPED: u8 = 2;

/// Executor lifecycle state.
///
/// `RUNNING` accepts work. `DRAINING` (orderly shutdown) refuses new work
/// but lets queued envelopes run out. `STOPPED` (immediate shutdown) also
/// interrupts sleeping and running envelopes through the interrupt signal.
pub(crate) struct ShutdownState {
    phase: AtomicU8,
    /// Woken when an immediate shutdown is requested.
    interrupt: Notify,
    /// Woken whenever the queue may have drained to empty.
    idle: Notify,
}

impl ShutdownState {
    pub(crate) fn new() -> Self {
        Self {
            phase: AtomicU8::new(RUNNING),
            interrupt: Notify::new(),
            idle: Notify::new(),
        }
    }

    pub(crate) fn accepting(&self) -> bool {
        self.phase.load(Ordering::Acquire) == RUNNING
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.phase.load(Ordering::Acquire) == STOPPED
    }

    /// Begins an orderly shutdown. Returns false if a shutdown was already
    /// in progress.
    pub(crate) fn begin_drain(&self) -> bool {
        self.phase
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Begins an immediate shutdown and interrupts every waiter.
    pub(crate) fn stop(&self) {
        self.phase.store(STOPPED, Ordering::Release);
        self.interrupt.notify_waiters();
    }

    /// Resolves once an immediate shutdown has been requested.
    pub(crate) async fn interrupted(&self) {
        loop {
            let notified = self.interrupt.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }

    /// Wakes shutdown waiters; called after every queue transition that can
    /// reach the empty state.
    pub(crate) fn notify_idle(&self) {
        self.idle.notify_waiters();
    }

    /// Resolves once the gate holds no queued or running envelopes.
    pub(crate) async fn drained(&self, gate: &AdmissionGate) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if gate.is_idle() {
                return;
            }
            notified.await;
        }
    }
}
