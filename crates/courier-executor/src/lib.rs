//! Asynchronous dispatch core for telemetry event submission.
//!
//! This crate provides [`RetryExecutor`], a bounded, retrying, flushable
//! work pool. Producers submit opaque [`Task`]s; the pool executes them on a
//! limited number of workers, reschedules failed attempts with the task's
//! own retry hint or a pluggable [`BackoffStrategy`], and exposes a
//! single-flight [`flush`](RetryExecutor::flush) barrier that waits for
//! in-flight work to settle.
//!
//! # Features
//!
//! - **Bounded admission**: a soft cap on `queued + running` envelopes;
//!   submissions beyond it are refused instead of buffered without limit.
//! - **Per-task retry**: failed attempts are rescheduled up to a configured
//!   bound, honoring a task-supplied delay hint when present.
//! - **Single-flight flush**: concurrent flush callers share one handle;
//!   the flush waits only for the work that was running when it started.
//! - **Shutdown**: orderly (drain queued work) or immediate (interrupt
//!   running work), with a rejected-task hook for late submissions.
//! - **Observability**: an event system plus optional `tracing` and
//!   `metrics` integration.
//!
//! # Examples
//!
//! ## Submitting work
//!
//! ```
//! use courier_executor::{task_fn, RetryExecutor};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let executor = RetryExecutor::builder()
//!     .worker_count(2)
//!     .max_retries(3)
//!     .max_queue_size(32)
//!     .build();
//!
//! let handle = executor.submit(task_fn(|| async {
//!     // deliver one captured event to the ingestion endpoint
//!     Ok(())
//! }));
//!
//! // Wait for the current in-flight work to settle.
//! executor.flush(Duration::from_secs(2)).wait().await;
//! println!("delivered: {}", handle.is_done());
//! # }
//! ```
//!
//! ## Custom backoff
//!
//! ```
//! use courier_executor::{ExponentialBackoff, RetryExecutor};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let executor = RetryExecutor::builder()
//!     .backoff(ExponentialBackoff::new(Duration::from_millis(250)).with_ceiling(Duration::from_secs(30)))
//!     .on_retry(|attempt, delay| {
//!         println!("attempt {attempt} failed, next in {delay:?}");
//!     })
//!     .build();
//! # let _ = executor;
//! # }
//! ```
//!
//! Failures are never surfaced to submitters: a task that exhausts its
//! retries is dropped, visible only through the event hooks and the
//! handle's done state.

mod admission;
mod backoff;
mod config;
mod envelope;
mod error;
mod events;
mod executor;
mod flush;
mod shutdown;
mod task;

pub use backoff::{BackoffStrategy, ExponentialBackoff, FixedDelay, FnBackoff};
pub use config::{ExecutorConfig, ExecutorConfigBuilder};
pub use courier_core::BoxError;
pub use error::SubmitError;
pub use events::DispatchEvent;
pub use executor::RetryExecutor;
pub use flush::FlushHandle;
pub use task::{task_fn, CompletionHandle, Task, TaskFn};
