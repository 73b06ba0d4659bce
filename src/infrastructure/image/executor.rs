//! Tokio-backed job executor with a bounded number of workers.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::domain::errors::LoadError;
use crate::domain::ports::ImageExecutor;

/// Default number of loads running at once.
pub const DEFAULT_WORKERS: usize = 4;

/// Spawns jobs on a Tokio runtime, at most `workers` at a time.
#[derive(Debug, Clone)]
pub struct TokioImageExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl TokioImageExecutor {
    /// Creates an executor on `handle`. Zero workers is treated as one.
    #[must_use]
    pub fn new(handle: Handle, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Creates an executor on the runtime of the calling context.
    ///
    /// # Errors
    /// Returns a setup error outside a Tokio runtime.
    pub fn current(workers: usize) -> Result<Self, LoadError> {
        let handle = Handle::try_current()
            .map_err(|e| LoadError::setup(format!("No async runtime available: {e}")))?;
        Ok(Self::new(handle, workers))
    }

    /// Maximum jobs running at once.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }
}

impl ImageExecutor for TokioImageExecutor {
    fn execute(&self, job: BoxFuture<'static, ()>) {
        let permits = Arc::clone(&self.permits);
        self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }
}

/// Runs CPU-bound `work` on the blocking pool when inside a Tokio runtime,
/// inline otherwise.
///
/// # Errors
/// Returns a decode error if the worker thread panicked.
pub async fn run_blocking<T, F>(work: F) -> Result<T, LoadError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if Handle::try_current().is_err() {
        return Ok(work());
    }
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LoadError::decode(format!("Decode worker failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use futures_util::FutureExt;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_jobs_run() {
        let executor = TokioImageExecutor::current(2).expect("inside runtime");
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..3 {
            let tx = tx.clone();
            executor.execute(async move { tx.send(i).ok(); }.boxed());
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_limit_is_respected() {
        let executor = TokioImageExecutor::current(2).expect("inside runtime");
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let tx = tx.clone();
            executor.execute(
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    tx.send(()).ok();
                }
                .boxed(),
            );
        }
        drop(tx);

        let mut finished = 0;
        while rx.recv().await.is_some() {
            finished += 1;
        }
        assert_eq!(finished, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let executor = TokioImageExecutor::new(runtime.handle().clone(), 0);
        assert_eq!(executor.workers(), 1);
    }

    #[test]
    fn test_current_outside_runtime_fails() {
        assert!(matches!(
            TokioImageExecutor::current(4),
            Err(LoadError::Setup { .. })
        ));
    }

    #[test]
    fn test_run_blocking_inline_without_runtime() {
        let value = run_blocking(|| 21 * 2)
            .now_or_never()
            .expect("completes immediately");
        assert_eq!(value, Ok(42));
    }

    #[tokio::test]
    async fn test_run_blocking_on_pool() {
        assert_eq!(run_blocking(|| "done").await, Ok("done"));
    }
}
