//! Error types for the dispatch executor.

/// Reasons a submission was refused.
///
/// [`crate::RetryExecutor::submit`] swallows these and returns an
/// already-canceled handle; [`crate::RetryExecutor::try_submit`] surfaces
/// them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    /// The soft cap on queued plus running envelopes was reached.
    #[error("dispatch queue is full ({depth}/{max_queue_size})")]
    QueueFull {
        /// Queued plus running envelopes at the admission decision.
        depth: usize,
        /// The configured bound.
        max_queue_size: usize,
    },
    /// The executor has begun shutting down.
    #[error("executor is shut down")]
    ShutDown,
}
