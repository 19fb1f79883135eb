use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::admission::AdmissionGate;
use crate::config::ExecutorConfig;
use crate::envelope::TaskEnvelope;
use crate::error::SubmitError;
use crate::events::DispatchEvent;
use crate::flush::{FlushBarrier, FlushHandle};
use crate::shutdown::ShutdownState;
use crate::task::{CompletionHandle, Task};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};

/// A bounded, retrying, flushable dispatch pool.
///
/// Submitted tasks run immediately when a worker slot is free; failed
/// attempts are rescheduled with the task's retry hint or the configured
/// backoff until the retry bound is reached. [`flush`](Self::flush) waits
/// for the currently running work to settle; [`shutdown`](Self::shutdown)
/// and [`shutdown_now`](Self::shutdown_now) terminate the pool.
///
/// Cloning is cheap and clones share the same pool.
#[derive(Clone)]
pub struct RetryExecutor {
    shared: Arc<ExecutorShared>,
}

struct ExecutorShared {
    config: ExecutorConfig,
    runtime: tokio::runtime::Handle,
    gate: AdmissionGate,
    permits: Arc<Semaphore>,
    flush: FlushBarrier,
    shutdown: ShutdownState,
}

impl ExecutorShared {
    fn emit(&self, event: DispatchEvent) {
        self.config.event_listeners.emit(&event);
    }

    #[cfg(any(feature = "tracing", feature = "metrics"))]
    fn name(&self) -> &str {
        &self.config.name
    }

    fn source(&self) -> String {
        self.config.name.clone()
    }
}

impl RetryExecutor {
    /// Creates a new builder.
    pub fn builder() -> crate::config::ExecutorConfigBuilder {
        crate::config::ExecutorConfigBuilder::new()
    }

    pub(crate) fn new(mut config: ExecutorConfig) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "dispatch_submitted_total",
                "Total number of tasks admitted into the dispatch queue"
            );
            describe_counter!(
                "dispatch_rejected_total",
                "Total number of submissions refused at admission or after shutdown"
            );
            describe_counter!(
                "dispatch_retries_total",
                "Total number of rescheduled attempts"
            );
            describe_counter!(
                "dispatch_completed_total",
                "Total number of tasks that completed successfully"
            );
            describe_counter!(
                "dispatch_exhausted_total",
                "Total number of tasks that failed their final attempt"
            );
            describe_counter!("dispatch_flushes_total", "Total number of resolved flushes");
        }

        let runtime = config
            .runtime
            .take()
            .unwrap_or_else(tokio::runtime::Handle::current);

        Self {
            shared: Arc::new(ExecutorShared {
                gate: AdmissionGate::new(config.max_queue_size),
                permits: Arc::new(Semaphore::new(config.worker_count)),
                flush: FlushBarrier::new(),
                shutdown: ShutdownState::new(),
                runtime,
                config,
            }),
        }
    }

    /// Submits a task, or reports why it was refused.
    ///
    /// On `Err` the task has been dropped (after the rejected handler ran,
    /// for the shutdown path).
    pub fn try_submit<T: Task>(&self, task: T) -> Result<CompletionHandle, SubmitError> {
        let shared = &self.shared;

        if !shared.shutdown.accepting() {
            if let Some(handler) = &shared.config.rejected_handler {
                handler(&task);
            }

            #[cfg(feature = "tracing")]
            warn!(dispatch = %shared.name(), "submission refused, executor is shut down");

            #[cfg(feature = "metrics")]
            counter!("dispatch_rejected_total", "dispatch" => shared.name().to_string(), "reason" => "shutdown")
                .increment(1);

            shared.emit(DispatchEvent::TaskRejected {
                source: shared.source(),
                timestamp: std::time::Instant::now(),
                depth: shared.gate.depth(),
            });
            return Err(SubmitError::ShutDown);
        }

        if !shared.gate.try_admit() {
            let depth = shared.gate.depth();

            #[cfg(feature = "tracing")]
            debug!(dispatch = %shared.name(), depth, "submission refused, queue is full");

            #[cfg(feature = "metrics")]
            counter!("dispatch_rejected_total", "dispatch" => shared.name().to_string(), "reason" => "queue_full")
                .increment(1);

            shared.emit(DispatchEvent::TaskRejected {
                source: shared.source(),
                timestamp: std::time::Instant::now(),
                depth,
            });
            return Err(SubmitError::QueueFull {
                depth,
                max_queue_size: shared.gate.max_queue_size(),
            });
        }

        let handle = CompletionHandle::new();
        let envelope = TaskEnvelope::first(Arc::new(task), handle.state());
        shared.gate.enqueue();

        #[cfg(feature = "metrics")]
        counter!("dispatch_submitted_total", "dispatch" => shared.name().to_string()).increment(1);

        spawn_envelope(Arc::clone(shared), envelope);
        Ok(handle)
    }

    /// Submits a task.
    ///
    /// A refused submission (queue full, or executor shut down) returns an
    /// already-canceled, already-done handle; failures are never surfaced
    /// to the submitter.
    pub fn submit<T: Task>(&self, task: T) -> CompletionHandle {
        match self.try_submit(task) {
            Ok(handle) => handle,
            Err(_) => CompletionHandle::rejected(),
        }
    }

    /// Starts (or joins) a flush and returns its handle.
    ///
    /// The flush waits up to `timeout` for every envelope that was running
    /// when the drainer started. If a flush is already in flight its handle
    /// is returned instead and `timeout` is ignored. After shutdown the
    /// returned handle is already canceled and done.
    pub fn flush(&self, timeout: Duration) -> FlushHandle {
        if !self.shared.shutdown.accepting() {
            return FlushHandle::finished_canceled();
        }

        let (handle, installed) = self.shared.flush.install_or_join();
        if installed {
            let shared = Arc::clone(&self.shared);
            let drainer = handle.clone();
            self.shared
                .runtime
                .spawn(async move { drain(shared, drainer, timeout).await });
        }
        handle
    }

    /// Orderly shutdown: refuses new work, then resolves once every queued
    /// and running envelope has run out.
    pub async fn shutdown(&self) {
        if self.shared.shutdown.begin_drain() {
            #[cfg(feature = "tracing")]
            info!(dispatch = %self.shared.name(), "shutting down, draining queued work");

            self.shared.emit(DispatchEvent::ShutdownStarted {
                source: self.shared.source(),
                timestamp: std::time::Instant::now(),
                immediate: false,
            });
        }
        self.shared.shutdown.drained(&self.shared.gate).await;
    }

    /// Immediate shutdown: refuses new work, discards queued envelopes, and
    /// interrupts running ones, then resolves once the pool is empty.
    pub async fn shutdown_now(&self) {
        if !self.shared.shutdown.is_stopped() {
            #[cfg(feature = "tracing")]
            info!(dispatch = %self.shared.name(), "shutting down immediately");

            self.shared.emit(DispatchEvent::ShutdownStarted {
                source: self.shared.source(),
                timestamp: std::time::Instant::now(),
                immediate: true,
            });
        }
        self.shared.shutdown.stop();
        self.shared.shutdown.drained(&self.shared.gate).await;
    }

    /// Envelopes accepted but not yet executing.
    pub fn queued(&self) -> usize {
        self.shared.gate.queued()
    }

    /// Envelopes currently executing.
    pub fn running(&self) -> usize {
        self.shared.gate.running()
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("queued", &self.queued())
            .field("running", &self.running())
            .finish()
    }
}

/// Spawns the drive loop for one envelope. Boxing breaks the type cycle a
/// reschedule would otherwise create.
fn spawn_envelope(shared: Arc<ExecutorShared>, envelope: TaskEnvelope) {
    let runtime = shared.runtime.clone();
    let fut: BoxFuture<'static, ()> = Box::pin(drive(shared, envelope));
    runtime.spawn(fut);
}

/// Drives one envelope from its scheduled delay through after-run.
async fn drive(shared: Arc<ExecutorShared>, envelope: TaskEnvelope) {
    // Delay phase: the envelope counts as queued. An immediate shutdown
    // discards it without running.
    if !envelope.delay().is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(envelope.delay()) => {}
            _ = shared.shutdown.interrupted() => {
                discard_queued(&shared, &envelope);
                return;
            }
        }
    }

    // Canceled while queued: terminal, the attempt never starts.
    if envelope.is_canceled() {
        shared.emit(DispatchEvent::TaskCanceled {
            source: shared.source(),
            timestamp: std::time::Instant::now(),
        });
        discard_queued(&shared, &envelope);
        return;
    }

    // Worker slot.
    let permit = tokio::select! {
        permit = Arc::clone(&shared.permits).acquire_owned() => {
            match permit {
                Ok(permit) => permit,
                Err(_) => {
                    discard_queued(&shared, &envelope);
                    return;
                }
            }
        }
        _ = shared.shutdown.interrupted() => {
            discard_queued(&shared, &envelope);
            return;
        }
    };

    // Canceled while waiting for a worker: still terminal before the run.
    if envelope.is_canceled() {
        drop(permit);
        shared.emit(DispatchEvent::TaskCanceled {
            source: shared.source(),
            timestamp: std::time::Instant::now(),
        });
        discard_queued(&shared, &envelope);
        return;
    }

    // Before-run.
    let run_epoch = shared.flush.task_started(&shared.gate);

    // The task body races the interrupt signal; losing the race drops the
    // body at an await point, so interruption stays cooperative.
    let outcome = tokio::select! {
        result = envelope.run() => Some(result),
        _ = shared.shutdown.interrupted() => None,
    };
    drop(permit);

    // After-run.
    match outcome {
        None => {
            // Interrupted: the sole path that neither reschedules nor
            // reports the failure.
            envelope.mark_done();
        }
        Some(Ok(())) => {
            envelope.mark_done();

            #[cfg(feature = "metrics")]
            counter!("dispatch_completed_total", "dispatch" => shared.name().to_string())
                .increment(1);

            #[cfg(feature = "tracing")]
            debug!(
                dispatch = %shared.name(),
                attempts = envelope.attempt() + 1,
                "task completed"
            );

            shared.emit(DispatchEvent::TaskCompleted {
                source: shared.source(),
                timestamp: std::time::Instant::now(),
                attempts: envelope.attempt() + 1,
            });
        }
        Some(Err(_error)) => {
            if envelope.is_canceled() {
                // A canceled chain never reschedules; the finished attempt
                // could not be revoked.
                envelope.mark_done();
                shared.emit(DispatchEvent::TaskCanceled {
                    source: shared.source(),
                    timestamp: std::time::Instant::now(),
                });
            } else if envelope.attempt() < shared.config.max_retries {
                let delay = envelope
                    .retry_hint()
                    .unwrap_or_else(|| shared.config.backoff.delay(envelope.attempt()));

                #[cfg(feature = "metrics")]
                counter!("dispatch_retries_total", "dispatch" => shared.name().to_string())
                    .increment(1);

                #[cfg(feature = "tracing")]
                debug!(
                    dispatch = %shared.name(),
                    error = %_error,
                    attempt = envelope.attempt() + 1,
                    delay_ms = delay.as_millis(),
                    "attempt failed, retrying after delay"
                );

                shared.emit(DispatchEvent::RetryScheduled {
                    source: shared.source(),
                    timestamp: std::time::Instant::now(),
                    attempt: envelope.attempt() + 1,
                    delay,
                });

                let next = envelope.next_attempt(delay);
                shared.gate.enqueue();
                spawn_envelope(Arc::clone(&shared), next);
            } else {
                envelope.mark_done();

                #[cfg(feature = "metrics")]
                counter!("dispatch_exhausted_total", "dispatch" => shared.name().to_string())
                    .increment(1);

                #[cfg(feature = "tracing")]
                warn!(
                    dispatch = %shared.name(),
                    error = %_error,
                    attempts = envelope.attempt() + 1,
                    "retries exhausted, dropping task"
                );

                shared.emit(DispatchEvent::RetriesExhausted {
                    source: shared.source(),
                    timestamp: std::time::Instant::now(),
                    attempts: envelope.attempt() + 1,
                });
            }
        }
    }

    // Cleanup: every exit path from a run ends here. This is the only
    // signal the flush barrier observes.
    shared.flush.task_completed(&shared.gate, run_epoch);
    shared.shutdown.notify_idle();
}

/// Discards an envelope that never entered execution.
fn discard_queued(shared: &ExecutorShared, envelope: &TaskEnvelope) {
    shared.gate.drop_queued();
    envelope.mark_done();
    shared.shutdown.notify_idle();
}

/// The drainer body for one flush.
async fn drain(shared: Arc<ExecutorShared>, handle: FlushHandle, timeout: Duration) {
    if !handle.enter_drainer() {
        // Canceled before the body began; the cancel path tore the flight
        // down (or this call just did).
        shared.emit(DispatchEvent::FlushCanceled {
            source: shared.source(),
            timestamp: std::time::Instant::now(),
        });
        return;
    }

    let snapshot = shared.flush.arm_snapshot(&handle, &shared.gate);

    #[cfg(feature = "tracing")]
    debug!(dispatch = %shared.name(), snapshot, timeout_ms = timeout.as_millis(), "flush started");

    shared.emit(DispatchEvent::FlushStarted {
        source: shared.source(),
        timestamp: std::time::Instant::now(),
        snapshot,
    });

    if snapshot > 0 {
        // Deadline expiry is a normal completion; remaining work proceeds
        // untouched.
        let _ = tokio::time::timeout(timeout, handle.await_countdown()).await;
    }

    let canceled = handle.is_canceled();
    handle.finish();

    #[cfg(feature = "metrics")]
    counter!(
        "dispatch_flushes_total",
        "dispatch" => shared.name().to_string(),
        "result" => if canceled { "canceled" } else { "finished" }
    )
    .increment(1);

    #[cfg(feature = "tracing")]
    debug!(dispatch = %shared.name(), canceled, "flush resolved");

    if canceled {
        shared.emit(DispatchEvent::FlushCanceled {
            source: shared.source(),
            timestamp: std::time::Instant::now(),
        });
    } else {
        shared.emit(DispatchEvent::FlushFinished {
            source: shared.source(),
            timestamp: std::time::Instant::now(),
        });
    }
}
