use std::time::{Duration, Instant};

use courier_core::events::CourierEvent;

/// Events emitted by the dispatch executor.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A submission was refused at admission or after shutdown.
    TaskRejected {
        source: String,
        timestamp: Instant,
        /// Queued plus running envelopes at the decision point.
        depth: usize,
    },
    /// A failed attempt was rescheduled.
    RetryScheduled {
        source: String,
        timestamp: Instant,
        /// Attempts made so far (the failed attempt's 1-based number).
        attempt: u32,
        delay: Duration,
    },
    /// A task completed successfully.
    TaskCompleted {
        source: String,
        timestamp: Instant,
        /// Total attempts made, including the first.
        attempts: u32,
    },
    /// A task failed on its final permitted attempt.
    RetriesExhausted {
        source: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// A task's attempt chain ended because its handle was canceled.
    TaskCanceled {
        source: String,
        timestamp: Instant,
    },
    /// A drainer started with the given running-count snapshot.
    FlushStarted {
        source: String,
        timestamp: Instant,
        snapshot: usize,
    },
    /// A flush resolved, by draining its snapshot or by deadline expiry.
    FlushFinished {
        source: String,
        timestamp: Instant,
    },
    /// A flush was canceled before it resolved.
    FlushCanceled {
        source: String,
        timestamp: Instant,
    },
    /// Shutdown began.
    ShutdownStarted {
        source: String,
        timestamp: Instant,
        /// True for `shutdown_now`.
        immediate: bool,
    },
}

impl CourierEvent for DispatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DispatchEvent::TaskRejected { .. } => "TaskRejected",
            DispatchEvent::RetryScheduled { .. } => "RetryScheduled",
            DispatchEvent::TaskCompleted { .. } => "TaskCompleted",
            DispatchEvent::RetriesExhausted { .. } => "RetriesExhausted",
            DispatchEvent::TaskCanceled { .. } => "TaskCanceled",
            DispatchEvent::FlushStarted { .. } => "FlushStarted",
            DispatchEvent::FlushFinished { .. } => "FlushFinished",
            DispatchEvent::FlushCanceled { .. } => "FlushCanceled",
            DispatchEvent::ShutdownStarted { .. } => "ShutdownStarted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            DispatchEvent::TaskRejected { timestamp, .. }
            | DispatchEvent::RetryScheduled { timestamp, .. }
            | DispatchEvent::TaskCompleted { timestamp, .. }
            | DispatchEvent::RetriesExhausted { timestamp, .. }
            | DispatchEvent::TaskCanceled { timestamp, .. }
            | DispatchEvent::FlushStarted { timestamp, .. }
            | DispatchEvent::FlushFinished { timestamp, .. }
            | DispatchEvent::FlushCanceled { timestamp, .. }
            | DispatchEvent::ShutdownStarted { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            DispatchEvent::TaskRejected { source, .. }
            | DispatchEvent::RetryScheduled { source, .. }
            | DispatchEvent::TaskCompleted { source, .. }
            | DispatchEvent::RetriesExhausted { source, .. }
            | DispatchEvent::TaskCanceled { source, .. }
            | DispatchEvent::FlushStarted { source, .. }
            | DispatchEvent::FlushFinished { source, .. }
            | DispatchEvent::FlushCanceled { source, .. }
            | DispatchEvent::ShutdownStarted { source, .. } => source,
        }
    }
}
