//! The unit of work consumed by the executor, and the handle returned to
//! submitters.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_core::BoxError;
use futures::future::BoxFuture;

/// A unit of dispatch work.
///
/// Tasks carry no result value: the executor observes only success or
/// failure, and failures drive the retry machinery. A task body may be run
/// several times (on fresh attempts), so it takes `&self`.
pub trait Task: Send + Sync + 'static {
    /// Executes the task once.
    fn run(&self) -> BoxFuture<'_, Result<(), BoxError>>;

    /// Suggested delay before the next attempt after a failure.
    ///
    /// `None` means "no suggestion": the executor falls back to its
    /// configured backoff strategy. `Some(Duration::ZERO)` is a concrete
    /// request for an immediate reschedule, not an absence. The two are
    /// never conflated.
    fn retry_hint(&self) -> Option<Duration> {
        None
    }
}

/// Creates a [`Task`] from an async closure.
///
/// ```
/// use courier_executor::task_fn;
///
/// let task = task_fn(|| async { Ok(()) });
/// # let _ = task;
/// ```
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    TaskFn { f }
}

/// A [`Task`] backed by a closure, returned by [`task_fn`].
pub struct TaskFn<F> {
    f: F,
}

impl<F, Fut> Task for TaskFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn run(&self) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin((self.f)())
    }
}

/// Handle returned by [`crate::RetryExecutor::submit`].
///
/// The handle carries no result value: each retry is driven by a fresh
/// internal envelope, so a value observed through the original handle would
/// be meaningless. The only contract is cancellation and completion; callers
/// that need a completion signal for in-flight work should use
/// [`crate::RetryExecutor::flush`].
#[derive(Clone)]
pub struct CompletionHandle {
    state: Arc<CompletionState>,
}

pub(crate) struct CompletionState {
    canceled: AtomicBool,
    done: AtomicBool,
}

impl CompletionHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(CompletionState {
                canceled: AtomicBool::new(false),
                done: AtomicBool::new(false),
            }),
        }
    }

    /// A handle that was never admitted: already canceled and done.
    pub(crate) fn rejected() -> Self {
        Self {
            state: Arc::new(CompletionState {
                canceled: AtomicBool::new(true),
                done: AtomicBool::new(true),
            }),
        }
    }

    pub(crate) fn state(&self) -> Arc<CompletionState> {
        Arc::clone(&self.state)
    }

    /// Requests cancellation of the task's attempt chain.
    ///
    /// Cancellation is cooperative: an attempt already executing runs to its
    /// end, but no further attempt is scheduled afterwards.
    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::Release);
    }

    /// Returns true if the handle was canceled (by the caller or by
    /// rejection).
    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::Acquire)
    }

    /// Returns true once no further attempt will run for this task.
    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("canceled", &self.is_canceled())
            .field("done", &self.is_done())
            .finish()
    }
}

impl CompletionState {
    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }
}
