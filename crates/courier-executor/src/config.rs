use std::sync::Arc;
use std::time::Duration;

use courier_core::events::{EventListener, EventListeners, FnListener};

use crate::backoff::{BackoffStrategy, ExponentialBackoff};
use crate::events::DispatchEvent;
use crate::executor::RetryExecutor;
use crate::task::Task;

/// Handler invoked when a submission is refused because the executor has
/// shut down. Soft-cap rejections do not reach it.
pub(crate) type RejectedHandler = Arc<dyn Fn(&dyn Task) + Send + Sync>;

/// Configuration for the dispatch executor.
pub struct ExecutorConfig {
    pub(crate) worker_count: usize,
    pub(crate) max_retries: u32,
    pub(crate) max_queue_size: usize,
    pub(crate) backoff: Arc<dyn BackoffStrategy>,
    pub(crate) runtime: Option<tokio::runtime::Handle>,
    pub(crate) rejected_handler: Option<RejectedHandler>,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<DispatchEvent>,
}

impl ExecutorConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::new()
    }
}

/// Builder for [`ExecutorConfig`].
pub struct ExecutorConfigBuilder {
    worker_count: usize,
    max_retries: u32,
    max_queue_size: usize,
    backoff: Option<Arc<dyn BackoffStrategy>>,
    runtime: Option<tokio::runtime::Handle>,
    rejected_handler: Option<RejectedHandler>,
    name: String,
    event_listeners: EventListeners<DispatchEvent>,
}

impl Default for ExecutorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - worker_count: 1
    /// - max_retries: 3 (so up to 4 attempts per task)
    /// - max_queue_size: 50
    /// - backoff: exponential, 1 second base, 60 second ceiling
    /// - name: `"dispatch"`
    pub fn new() -> Self {
        Self {
            worker_count: 1,
            max_retries: 3,
            max_queue_size: 50,
            backoff: None,
            runtime: None,
            rejected_handler: None,
            name: "dispatch".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the maximum number of concurrently running envelopes.
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Sets the retry bound per task. A task runs at most
    /// `max_retries + 1` times.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the soft cap on `queued + running` envelopes.
    pub fn max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Sets the backoff strategy consulted when a failed task offers no
    /// retry hint.
    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: BackoffStrategy + 'static,
    {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Sets the runtime handle envelopes are spawned on.
    ///
    /// Defaults to the runtime current at [`build`](Self::build) time.
    pub fn runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Registers a handler for submissions refused after shutdown.
    ///
    /// The handler receives the refused task. It is not invoked on soft-cap
    /// rejections.
    pub fn rejected_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Task) + Send + Sync + 'static,
    {
        self.rejected_handler = Some(Arc::new(f));
        self
    }

    /// Sets the instance name used in events and logs.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers an event listener.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<DispatchEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback for each rejected submission.
    ///
    /// Called with the queue depth observed at the decision point.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let DispatchEvent::TaskRejected { depth, .. } = event {
                f(*depth);
            }
        }));
        self
    }

    /// Registers a callback for each scheduled retry.
    ///
    /// Called with the number of attempts made so far and the delay before
    /// the next one.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let DispatchEvent::RetryScheduled { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback for each task that completes successfully.
    ///
    /// Called with the total number of attempts made.
    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let DispatchEvent::TaskCompleted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback for each task that fails its final attempt.
    ///
    /// Called with the total number of attempts made.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let DispatchEvent::RetriesExhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback for each flush that resolves (drained or timed
    /// out, but not canceled).
    pub fn on_flush_finished<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, DispatchEvent::FlushFinished { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the executor.
    ///
    /// # Panics
    ///
    /// Panics if no runtime handle was configured and the builder is used
    /// outside a tokio runtime.
    pub fn build(self) -> RetryExecutor {
        let backoff = self
            .backoff
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::default()));

        let config = ExecutorConfig {
            worker_count: self.worker_count.max(1),
            max_retries: self.max_retries,
            max_queue_size: self.max_queue_size.max(1),
            backoff,
            runtime: self.runtime,
            rejected_handler: self.rejected_handler,
            name: self.name,
            event_listeners: self.event_listeners,
        };

        RetryExecutor::new(config)
    }
}
