//! Worker pool for scheduled tasks

use super::service::WorkerService;
use super::worker::{Task, TaskSlot, Worker};
use crate::error::{DeployError, Result};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::runtime::{Builder, Runtime};

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

/// Runs submitted workers on a pool of blocking threads
///
/// Every submitted worker is tracked by the executor's [`WorkerService`] for
/// as long as it runs.
pub struct WorkerExecutor {
    runtime: Runtime,
    service: WorkerService,
}

impl WorkerExecutor {
    /// Create an executor with `threads` worker threads
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_service(threads, WorkerService::new())
    }

    /// Create an executor reporting into an existing service
    pub fn with_service(threads: usize, service: WorkerService) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name("wendeploy-worker")
            .enable_all()
            .build()?;

        Ok(Self { runtime, service })
    }

    pub fn service(&self) -> &WorkerService {
        &self.service
    }

    /// Schedule a worker and return its handle
    pub fn submit<T: Send + 'static>(&self, worker: Worker<T>) -> Task<T> {
        let id = self.service.next_id();
        let title = worker.title().to_string();
        let segment = worker.segment().clone();
        let cancel = worker.cancel_token().clone();
        let slot = TaskSlot::new();

        self.service.track(id, &title, &segment, &cancel);

        let service = self.service.clone();
        let completion = slot.clone();
        let task_title = title.clone();
        self.runtime.spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(|| worker.run()))
                .unwrap_or_else(|_| Err(DeployError::Panicked(task_title)));
            service.untrack(id);
            completion.complete(result);
        });

        Task::new(id, title, segment, cancel, slot)
    }

    /// Cancel every tracked task when Ctrl-C is pressed
    pub fn cancel_on_interrupt(&self) {
        self.cancel_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to listen for Ctrl-C: {}", e);
                    false
                }
            }
        });
    }

    /// Cancel every tracked task once `trigger` resolves to true
    pub fn cancel_on<F>(&self, trigger: F)
    where
        F: Future<Output = bool> + Send + 'static,
    {
        let service = self.service.clone();
        self.runtime.spawn(async move {
            if trigger.await {
                log::warn!("Interrupted, cancelling {} task(s)", service.len());
                service.cancel_all();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{Progress, WorkContext};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_submit_and_wait() {
        let executor = WorkerExecutor::new(2).unwrap();
        let task = executor.submit(Worker::new("answer", |ctx: &WorkContext| {
            ctx.segment().finish("done");
            Ok(42)
        }));

        assert_eq!(task.wait().unwrap(), 42);
    }

    #[test]
    fn test_task_untracked_after_completion() {
        let executor = WorkerExecutor::new(2).unwrap();
        let task = executor.submit(Worker::new("quick", |_ctx: &WorkContext| Ok(())));
        task.wait().unwrap();
        assert!(executor.service().is_empty());
    }

    #[test]
    fn test_cancel_running_task() {
        let executor = WorkerExecutor::new(2).unwrap();
        let (started_tx, started_rx) = mpsc::channel();

        let task = executor.submit(Worker::new("spin", move |ctx: &WorkContext| -> crate::Result<()> {
            started_tx.send(()).ok();
            loop {
                ctx.check_cancelled()?;
                ctx.segment().set_progress(Progress::Indeterminate);
                std::thread::sleep(Duration::from_millis(5));
            }
        }));

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(executor.service().len(), 1);
        executor.service().cancel_all();

        assert!(matches!(task.wait(), Err(DeployError::Cancelled)));
    }

    #[test]
    fn test_trigger_cancels_running_task() {
        let executor = WorkerExecutor::new(2).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (interrupt_tx, interrupt_rx) = tokio::sync::oneshot::channel::<()>();
        executor.cancel_on(async move { interrupt_rx.await.is_ok() });

        let task = executor.submit(Worker::new("spin", move |ctx: &WorkContext| -> crate::Result<()> {
            started_tx.send(()).ok();
            loop {
                ctx.check_cancelled()?;
                std::thread::sleep(Duration::from_millis(5));
            }
        }));

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        interrupt_tx.send(()).unwrap();

        assert!(matches!(task.wait(), Err(DeployError::Cancelled)));
    }

    #[test]
    fn test_dropped_trigger_does_not_cancel() {
        let executor = WorkerExecutor::new(1).unwrap();
        let (interrupt_tx, interrupt_rx) = tokio::sync::oneshot::channel::<()>();
        executor.cancel_on(async move { interrupt_rx.await.is_ok() });
        drop(interrupt_tx);

        let task = executor.submit(Worker::new("quick", |ctx: &WorkContext| {
            std::thread::sleep(Duration::from_millis(20));
            ctx.check_cancelled()?;
            Ok(7)
        }));
        assert_eq!(task.wait().unwrap(), 7);
    }

    #[test]
    fn test_panic_becomes_error() {
        let executor = WorkerExecutor::new(1).unwrap();
        let task = executor.submit(Worker::new("boom", |_ctx: &WorkContext| -> crate::Result<()> {
            panic!("boom");
        }));
        assert!(matches!(task.wait(), Err(DeployError::Panicked(title)) if title == "boom"));
    }
}
