//! Single-flight flush barrier.
//!
//! A flush waits for exactly the envelopes that were running when the
//! drainer started. At most one flush is in flight
//! process-wide; concurrent callers converge on the same handle.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::admission::AdmissionGate;

/// The single-flight slot. Holds the handle of the flush currently in
/// flight, if any.
pub(crate) struct Slot(Mutex<Option<FlushHandle>>);

pub(crate) struct FlushBarrier {
    slot: Arc<Slot>,
    /// Bumped when a drainer arms; run-start epochs below the bump belong
    /// to the snapshot.
    epoch: AtomicU64,
}

impl FlushBarrier {
    pub(crate) fn new() -> Self {
        Self {
            slot: Arc::new(Slot(Mutex::new(None))),
            epoch: AtomicU64::new(0),
        }
    }

    /// Joins the flush already in flight, or installs a fresh one.
    ///
    /// Returns the handle and whether this call installed it (the installer
    /// is responsible for spawning the drainer).
    pub(crate) fn install_or_join(&self) -> (FlushHandle, bool) {
        let mut slot = self.slot.0.lock();
        if let Some(existing) = slot.as_ref() {
            if !existing.is_done() {
                return (existing.clone(), false);
            }
        }
        let handle = FlushHandle::new(Arc::downgrade(&self.slot));
        *slot = Some(handle.clone());
        (handle, true)
    }

    /// Records an envelope entering execution and returns its run epoch.
    ///
    /// Happens under the slot lock so the queued-to-running transition is
    /// atomic with respect to [`FlushBarrier::arm_snapshot`]: an envelope
    /// either started before the snapshot (its epoch lies below the
    /// cutoff and its completion counts) or after (it is neither counted
    /// in the snapshot nor against it).
    pub(crate) fn task_started(&self, gate: &AdmissionGate) -> u64 {
        let _guard = self.slot.0.lock();
        gate.begin_run();
        self.epoch.load(Ordering::SeqCst)
    }

    /// Records one envelope completion.
    ///
    /// The running-counter decrement and the countdown decrement happen
    /// under the slot lock for the same atomicity; only envelopes whose
    /// run epoch predates the armed cutoff count against the snapshot.
    pub(crate) fn task_completed(&self, gate: &AdmissionGate, run_epoch: u64) {
        let guard = self.slot.0.lock();
        gate.finish_run();
        if let Some(handle) = guard.as_ref() {
            handle.shared.count_down(run_epoch);
        }
    }

    /// Takes the running-count snapshot and arms the countdown with it.
    ///
    /// Called by the drainer after it has entered its body, never at handle
    /// creation: envelopes finishing between handle creation and drainer
    /// entry must not be waited for.
    pub(crate) fn arm_snapshot(&self, handle: &FlushHandle, gate: &AdmissionGate) -> usize {
        let _guard = self.slot.0.lock();
        let snapshot = gate.running();
        let cutoff = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        handle.arm(snapshot, cutoff);
        snapshot
    }
}

struct FlushShared {
    /// Completions still awaited by the drainer. Meaningful once `armed`.
    remaining: AtomicUsize,
    /// Run epochs below this belong to the snapshot. Meaningful once
    /// `armed`.
    cutoff: AtomicU64,
    /// Set by the drainer after taking its snapshot; completions observed
    /// before arming are ignored.
    armed: AtomicBool,
    /// Set when the drainer body starts; decides which side of a
    /// cancellation race performs the teardown.
    drainer_entered: AtomicBool,
    canceled: AtomicBool,
    done: AtomicBool,
    /// Exactly one of {cancel path, drainer body} tears the flight down.
    cleanup_handled: AtomicBool,
    /// Wakes the drainer on countdown progress or cancellation.
    progress: Notify,
    /// Wakes `wait` callers when the handle resolves.
    resolved: Notify,
    slot: Weak<Slot>,
}

impl FlushShared {
    fn count_down(&self, run_epoch: u64) {
        if !self.armed.load(Ordering::Acquire) {
            return;
        }
        if run_epoch >= self.cutoff.load(Ordering::Acquire) {
            // Started after the snapshot was taken; not awaited.
            return;
        }
        let mut current = self.remaining.load(Ordering::Acquire);
        while current > 0 {
            match self.remaining.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if current == 1 {
                        self.progress.notify_waiters();
                    }
                    return;
                }
                Err(observed) => current = observed,
            }
        }
    }
}

/// Handle to a flush returned by [`crate::RetryExecutor::flush`].
///
/// All callers that requested the same flush hold handles to the same
/// flight; two handles compare equal exactly when they observe the same
/// flush. The handle resolves when the snapshot drains, the deadline
/// elapses, or the flush is canceled. A deadline expiry is a normal
/// completion, not an error.
#[derive(Clone)]
pub struct FlushHandle {
    shared: Arc<FlushShared>,
}

impl FlushHandle {
    fn new(slot: Weak<Slot>) -> Self {
        Self {
            shared: Arc::new(FlushShared {
                remaining: AtomicUsize::new(0),
                cutoff: AtomicU64::new(0),
                armed: AtomicBool::new(false),
                drainer_entered: AtomicBool::new(false),
                canceled: AtomicBool::new(false),
                done: AtomicBool::new(false),
                cleanup_handled: AtomicBool::new(false),
                progress: Notify::new(),
                resolved: Notify::new(),
                slot,
            }),
        }
    }

    /// A flush that never started: already canceled and done. Returned when
    /// the executor has shut down.
    pub(crate) fn finished_canceled() -> Self {
        Self {
            shared: Arc::new(FlushShared {
                remaining: AtomicUsize::new(0),
                cutoff: AtomicU64::new(0),
                armed: AtomicBool::new(false),
                drainer_entered: AtomicBool::new(false),
                canceled: AtomicBool::new(true),
                done: AtomicBool::new(true),
                cleanup_handled: AtomicBool::new(true),
                progress: Notify::new(),
                resolved: Notify::new(),
                slot: Weak::new(),
            }),
        }
    }

    /// Cancels the flush.
    ///
    /// If the drainer body has not started yet, this side releases the
    /// single-flight slot and resolves the handle. If the drainer is
    /// already waiting, the wait is interrupted and the drainer performs
    /// the teardown. The `cleanup_handled` flag guarantees exactly one of
    /// the two happens.
    pub fn cancel(&self) {
        if self.shared.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.progress.notify_waiters();
        if !self.shared.drainer_entered.load(Ordering::Acquire) && self.try_claim_cleanup() {
            self.teardown();
        }
    }

    /// Returns true if the flush was canceled.
    pub fn is_canceled(&self) -> bool {
        self.shared.canceled.load(Ordering::Acquire)
    }

    /// Returns true once the flush has resolved (drained, timed out, or
    /// canceled).
    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::Acquire)
    }

    /// Resolves when the flush does.
    pub async fn wait(&self) {
        loop {
            let notified = self.shared.resolved.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    /// Marks the drainer body as entered. Returns false if the flight was
    /// canceled first, in which case the flight is already (or about to be)
    /// torn down and the drainer must not proceed.
    pub(crate) fn enter_drainer(&self) -> bool {
        self.shared.drainer_entered.store(true, Ordering::Release);
        if self.is_canceled() {
            if self.try_claim_cleanup() {
                self.teardown();
            }
            return false;
        }
        true
    }

    fn arm(&self, snapshot: usize, cutoff: u64) {
        self.shared.remaining.store(snapshot, Ordering::Release);
        self.shared.cutoff.store(cutoff, Ordering::Release);
        self.shared.armed.store(true, Ordering::Release);
    }

    /// Resolves when the armed countdown reaches zero or the flush is
    /// canceled.
    pub(crate) async fn await_countdown(&self) {
        loop {
            let notified = self.shared.progress.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.remaining.load(Ordering::Acquire) == 0 || self.is_canceled() {
                return;
            }
            notified.await;
        }
    }

    /// Drainer-side teardown: releases the slot and resolves the handle,
    /// unless the cancel path already did.
    pub(crate) fn finish(&self) {
        if self.try_claim_cleanup() {
            self.teardown();
        }
    }

    fn try_claim_cleanup(&self) -> bool {
        !self.shared.cleanup_handled.swap(true, Ordering::AcqRel)
    }

    fn teardown(&self) {
        if let Some(slot) = self.shared.slot.upgrade() {
            let mut guard = slot.0.lock();
            // Only clear our own flight; a successor may already occupy
            // the slot.
            if guard.as_ref().map_or(false, |h| h == self) {
                *guard = None;
            }
        }
        self.shared.done.store(true, Ordering::Release);
        self.shared.resolved.notify_waiters();
    }
}

impl PartialEq for FlushHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for FlushHandle {}

impl std::fmt::Debug for FlushHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushHandle")
            .field("canceled", &self.is_canceled())
            .field("done", &self.is_done())
            .finish()
    }
}
