//! Port definition for running loader jobs.

use futures_util::future::BoxFuture;

/// Runs loader jobs off the main context.
///
/// Jobs offload decoding with `tokio::task::spawn_blocking` when they are
/// polled inside a Tokio runtime and decode inline otherwise.
pub trait ImageExecutor: Send + Sync {
    /// Schedules `job`. Must not block the caller.
    fn execute(&self, job: BoxFuture<'static, ()>);
}
