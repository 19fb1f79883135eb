//! Executor-internal wrapper pairing a task with its attempt counter.

use std::sync::Arc;
use std::time::Duration;

use courier_core::BoxError;

use crate::task::{CompletionState, Task};

/// One scheduled attempt of a task.
///
/// An envelope runs at most once. Rescheduling after a failure creates a
/// fresh envelope carrying the incremented attempt index and the same
/// underlying task; the old envelope is dropped.
pub(crate) struct TaskEnvelope {
    task: Arc<dyn Task>,
    completion: Arc<CompletionState>,
    /// Attempts already made before this envelope runs (0 for the first).
    attempt: u32,
    /// Wait before this attempt enters execution.
    delay: Duration,
}

impl TaskEnvelope {
    pub(crate) fn first(task: Arc<dyn Task>, completion: Arc<CompletionState>) -> Self {
        Self {
            task,
            completion,
            attempt: 0,
            delay: Duration::ZERO,
        }
    }

    /// The successor envelope scheduled after this attempt failed.
    pub(crate) fn next_attempt(&self, delay: Duration) -> Self {
        Self {
            task: Arc::clone(&self.task),
            completion: Arc::clone(&self.completion),
            attempt: self.attempt + 1,
            delay,
        }
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.completion.is_canceled()
    }

    pub(crate) fn mark_done(&self) {
        self.completion.mark_done();
    }

    pub(crate) fn retry_hint(&self) -> Option<Duration> {
        self.task.retry_hint()
    }

    pub(crate) async fn run(&self) -> Result<(), BoxError> {
        self.task.run().await
    }
}
