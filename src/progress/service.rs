//! Tracking of running tasks
//!
//! A [`WorkerService`] holds the set of tasks currently running and fires one
//! notification whenever membership changes or any member reports progress.
//! Display layers subscribe here instead of to individual tasks.

use super::cancel::CancelToken;
use super::segment::{ObserverId, Progress, Segment};
use super::worker::TaskId;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Summary of one running task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub id: TaskId,
    pub title: String,
    pub status: Option<String>,
    pub progress: Progress,
    pub must_confirm_cancel: bool,
}

/// State handed to service observers
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSnapshot {
    pub running: Vec<TaskSummary>,
    /// Mean of member progress; `None` when empty or any member is indeterminate
    pub progress: Option<f64>,
}

type ServiceObserver = Arc<dyn Fn(&ServiceSnapshot) + Send + Sync>;

struct TrackedTask {
    id: TaskId,
    title: String,
    segment: Segment,
    cancel: CancelToken,
    subscription: ObserverId,
}

#[derive(Default)]
struct ServiceState {
    running: Vec<TrackedTask>,
    observers: Vec<(ObserverId, ServiceObserver)>,
    next_task: u64,
    next_observer: u64,
}

#[derive(Default)]
struct ServiceInner {
    state: Mutex<ServiceState>,
}

/// Set of running tasks with aggregate progress and bulk cancellation
#[derive(Clone, Default)]
pub struct WorkerService {
    inner: Arc<ServiceInner>,
}

impl WorkerService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve an id for a task about to be tracked
    pub(crate) fn next_id(&self) -> TaskId {
        let mut state = self.lock();
        state.next_task += 1;
        TaskId(state.next_task)
    }

    /// Start tracking a task
    pub fn track(&self, id: TaskId, title: &str, segment: &Segment, cancel: &CancelToken) {
        let weak: Weak<ServiceInner> = Arc::downgrade(&self.inner);
        let subscription = segment.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                WorkerService { inner }.notify();
            }
        });

        self.lock().running.push(TrackedTask {
            id,
            title: title.to_string(),
            segment: segment.clone(),
            cancel: cancel.clone(),
            subscription,
        });
        log::debug!("Tracking task {} ({})", id, title);
        self.notify();
    }

    /// Stop tracking a task; returns false if it was not tracked
    pub fn untrack(&self, id: TaskId) -> bool {
        let removed = {
            let mut state = self.lock();
            let position = state.running.iter().position(|t| t.id == id);
            position.map(|index| state.running.remove(index))
        };

        match removed {
            Some(task) => {
                task.segment.unsubscribe(task.subscription);
                self.notify();
                true
            }
            None => false,
        }
    }

    /// Number of tasks currently running
    pub fn len(&self) -> usize {
        self.lock().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arithmetic mean of member progress
    pub fn progress(&self) -> Option<f64> {
        self.snapshot().progress
    }

    /// Whether any running task asks for confirmation before cancelling
    pub fn must_confirm_cancel(&self) -> bool {
        self.snapshot()
            .running
            .iter()
            .any(|task| task.must_confirm_cancel)
    }

    /// Request cancellation of every running task
    pub fn cancel_all(&self) {
        let tokens: Vec<CancelToken> = self.lock().running.iter().map(|t| t.cancel.clone()).collect();
        log::info!("Cancelling {} running task(s)", tokens.len());
        for token in tokens {
            token.cancel();
        }
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        let members: Vec<(TaskId, String, Segment)> = self
            .lock()
            .running
            .iter()
            .map(|t| (t.id, t.title.clone(), t.segment.clone()))
            .collect();

        let running: Vec<TaskSummary> = members
            .into_iter()
            .map(|(id, title, segment)| {
                let snapshot = segment.snapshot();
                TaskSummary {
                    id,
                    title,
                    status: snapshot.status,
                    progress: snapshot.progress,
                    must_confirm_cancel: snapshot.must_confirm_cancel,
                }
            })
            .collect();

        let progress = mean_progress(&running);
        ServiceSnapshot { running, progress }
    }

    /// Register a callback fired on membership or progress changes
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ServiceSnapshot) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.next_observer += 1;
        let id = ObserverId::from_raw(state.next_observer);
        state.observers.push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut state = self.lock();
        let before = state.observers.len();
        state.observers.retain(|(other, _)| *other != id);
        state.observers.len() != before
    }

    fn notify(&self) {
        let observers: Vec<ServiceObserver> =
            self.lock().observers.iter().map(|(_, o)| o.clone()).collect();
        if observers.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for observer in observers {
            observer(&snapshot);
        }
    }
}

fn mean_progress(running: &[TaskSummary]) -> Option<f64> {
    if running.is_empty() {
        return None;
    }

    let mut sum = 0.0;
    for task in running {
        sum += task.progress.value()?;
    }
    Some(sum / running.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn track(service: &WorkerService, title: &str) -> (TaskId, Segment, CancelToken) {
        let id = service.next_id();
        let segment = Segment::titled(title);
        let cancel = CancelToken::new();
        service.track(id, title, &segment, &cancel);
        (id, segment, cancel)
    }

    #[test]
    fn test_empty_service_has_no_aggregate() {
        let service = WorkerService::new();
        assert!(service.is_empty());
        assert_eq!(service.progress(), None);
    }

    #[test]
    fn test_mean_progress() {
        let service = WorkerService::new();
        let (_, a, _) = track(&service, "a");
        let (_, b, _) = track(&service, "b");

        a.set_progress(Progress::Determinate(1.0));
        b.set_progress(Progress::Determinate(0.5));
        assert_eq!(service.progress(), Some(0.75));

        b.set_progress(Progress::Indeterminate);
        assert_eq!(service.progress(), None);
    }

    #[test]
    fn test_untrack() {
        let service = WorkerService::new();
        let (id, segment, _) = track(&service, "a");
        assert_eq!(service.len(), 1);
        assert!(service.untrack(id));
        assert!(!service.untrack(id));
        assert!(service.is_empty());

        // No longer wired to the service
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        service.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        segment.set_status("late");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notifications_for_membership_and_progress() {
        let service = WorkerService::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        service.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let (id, segment, _) = track(&service, "a");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        segment.set_progress(Progress::Determinate(0.3));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        service.untrack(id);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancel_all() {
        let service = WorkerService::new();
        let (_, _, a) = track(&service, "a");
        let (_, _, b) = track(&service, "b");
        service.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_must_confirm_cancel() {
        let service = WorkerService::new();
        let (_, a, _) = track(&service, "a");
        assert!(!service.must_confirm_cancel());
        a.set_must_confirm_cancel(true);
        assert!(service.must_confirm_cancel());
    }
}
