//! Cancellable units of work and their scheduling handles

use super::cancel::CancelToken;
use super::segment::{Progress, Segment};
use crate::error::{DeployError, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Context handed to a running job
#[derive(Debug, Clone)]
pub struct WorkContext {
    segment: Segment,
    cancel: CancelToken,
}

impl WorkContext {
    pub fn new(segment: Segment, cancel: CancelToken) -> Self {
        Self { segment, cancel }
    }

    /// Root progress node of the job
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fail with `Cancelled` if the job was asked to stop
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }
}

type Job<T> = Box<dyn FnOnce(&WorkContext) -> Result<T> + Send + 'static>;

/// A cancellable unit of work, itself the root of a progress tree
pub struct Worker<T> {
    title: String,
    context: WorkContext,
    job: Job<T>,
}

impl<T> Worker<T> {
    pub fn new<F>(title: impl Into<String>, job: F) -> Self
    where
        F: FnOnce(&WorkContext) -> Result<T> + Send + 'static,
    {
        let title = title.into();
        let segment = Segment::titled(title.clone());
        Self {
            title,
            context: WorkContext::new(segment, CancelToken::new()),
            job: Box::new(job),
        }
    }

    /// Ask the user to confirm before cancelling this worker
    pub fn confirm_cancel(self, must_confirm: bool) -> Self {
        self.context.segment.set_must_confirm_cancel(must_confirm);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn segment(&self) -> &Segment {
        &self.context.segment
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.context.cancel
    }

    pub fn progress(&self) -> Progress {
        self.context.segment.progress()
    }

    pub fn status(&self) -> Option<String> {
        self.context.segment.status()
    }

    pub fn must_confirm_cancel(&self) -> bool {
        self.context.segment.must_confirm_cancel()
    }

    /// Run the job on the current thread
    pub fn run(self) -> Result<T> {
        self.context.check_cancelled()?;
        log::debug!("Starting task: {}", self.title);
        let result = (self.job)(&self.context);
        match &result {
            Ok(_) => log::debug!("Task finished: {}", self.title),
            Err(DeployError::Cancelled) => log::info!("Task cancelled: {}", self.title),
            Err(e) => log::debug!("Task failed: {}: {}", self.title, e),
        }
        result
    }
}

/// Completion slot shared between a task handle and its worker thread
pub(crate) struct TaskSlot<T> {
    outcome: Mutex<Option<Result<T>>>,
    done: Condvar,
}

impl<T> TaskSlot<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Result<T>>> {
        self.outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn complete(&self, result: Result<T>) {
        *self.lock() = Some(result);
        self.done.notify_all();
    }

    fn is_complete(&self) -> bool {
        self.lock().is_some()
    }

    fn take(&self) -> Result<T> {
        let mut outcome = self.lock();
        loop {
            if let Some(result) = outcome.take() {
                return result;
            }
            outcome = self
                .done
                .wait(outcome)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }
}

/// Identifier of a scheduled task within its service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a submitted worker
pub struct Task<T> {
    id: TaskId,
    title: String,
    segment: Segment,
    cancel: CancelToken,
    slot: Arc<TaskSlot<T>>,
}

impl<T> Task<T> {
    pub(crate) fn new(
        id: TaskId,
        title: String,
        segment: Segment,
        cancel: CancelToken,
        slot: Arc<TaskSlot<T>>,
    ) -> Self {
        Self {
            id,
            title,
            segment,
            cancel,
            slot,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn progress(&self) -> Progress {
        self.segment.progress()
    }

    pub fn must_confirm_cancel(&self) -> bool {
        self.segment.must_confirm_cancel()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.slot.is_complete()
    }

    /// Block until the worker finishes and return its result
    pub fn wait(self) -> Result<T> {
        self.slot.take()
    }
}
