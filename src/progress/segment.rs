//! Weighted progress tree
//!
//! A [`Segment`] is one node of the tree. Children are created with
//! [`Segment::split`], each owning a share (`percentage`) of its parent's span
//! starting at `offset`. When a child changes, the parent recomputes
//!
//! ```text
//! progress = (child.progress * child.percentage + child.offset) / parent.total
//! ```
//!
//! copies the child's title/status upward and notifies its own observers and
//! parent, so the root always carries one aggregate value.
//!
//! Every node guards its state with a single mutex. Observers are called after
//! the lock is released, with a snapshot of the node.

use std::sync::{Arc, Mutex, MutexGuard};

/// Tolerance when checking that children do not overcommit a node's span
const SPAN_EPSILON: f64 = 1e-9;

/// Completion state of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Amount of work is unknown
    Indeterminate,
    /// Fraction of work done, in [0, 1]
    Determinate(f64),
}

impl Progress {
    /// Build a progress from a done/total pair; unknown total is indeterminate
    pub fn fraction(done: u64, total: u64) -> Self {
        if total == 0 {
            Progress::Indeterminate
        } else {
            Progress::Determinate((done as f64 / total as f64).clamp(0.0, 1.0))
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Progress::Indeterminate => None,
            Progress::Determinate(v) => Some(*v),
        }
    }

    pub fn is_determinate(&self) -> bool {
        matches!(self, Progress::Determinate(_))
    }
}

impl Default for Progress {
    fn default() -> Self {
        Progress::Determinate(0.0)
    }
}

/// Point-in-time view of a node, handed to observers
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSnapshot {
    pub progress: Progress,
    pub title: Option<String>,
    pub status: Option<String>,
    pub must_confirm_cancel: bool,
    pub offset: f64,
    pub percentage: f64,
    pub total: f64,
}

/// Identifier returned by [`Segment::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

type Observer = Arc<dyn Fn(&SegmentSnapshot) + Send + Sync>;

#[derive(Default)]
struct SegmentState {
    progress: Progress,
    title: Option<String>,
    status: Option<String>,
    must_confirm_cancel: bool,
    offset: f64,
    percentage: f64,
    total: f64,
    interval: f64,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl SegmentState {
    fn snapshot(&self) -> SegmentSnapshot {
        SegmentSnapshot {
            progress: self.progress,
            title: self.title.clone(),
            status: self.status.clone(),
            must_confirm_cancel: self.must_confirm_cancel,
            offset: self.offset,
            percentage: self.percentage,
            total: self.total,
        }
    }
}

struct SegmentInner {
    state: Mutex<SegmentState>,
    parent: Option<Segment>,
}

/// A node of the progress tree; clones refer to the same node
#[derive(Clone)]
pub struct Segment {
    inner: Arc<SegmentInner>,
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("state", &self.snapshot())
            .finish()
    }
}

impl Default for Segment {
    fn default() -> Self {
        Self::root()
    }
}

impl Segment {
    /// Create a detached root node
    pub fn root() -> Self {
        Self {
            inner: Arc::new(SegmentInner {
                state: Mutex::new(SegmentState::default()),
                parent: None,
            }),
        }
    }

    /// Create a root node with a title
    pub fn titled(title: impl Into<String>) -> Self {
        let segment = Self::root();
        segment.lock().title = Some(title.into());
        segment
    }

    fn lock(&self) -> MutexGuard<'_, SegmentState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hand out a share `percentage` of this node's span to a new child
    ///
    /// The child starts where the previously handed-out shares end.
    pub fn split(&self, percentage: f64) -> Segment {
        let offset = {
            let mut state = self.lock();
            let offset = state.total;
            state.total += percentage;
            if state.total > 1.0 + SPAN_EPSILON {
                log::warn!(
                    "Progress span overcommitted: {:.3} handed out ({:?})",
                    state.total,
                    state.title
                );
            }
            offset
        };

        Segment {
            inner: Arc::new(SegmentInner {
                state: Mutex::new(SegmentState {
                    offset,
                    percentage,
                    interval: percentage,
                    ..SegmentState::default()
                }),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Hand out one of `count` equal slots of `percentage`
    ///
    /// Meant for fan-out loops: calling this `count` times hands out exactly
    /// `percentage` in total.
    pub fn split_each(&self, percentage: f64, count: usize) -> Segment {
        self.split(percentage / count.max(1) as f64)
    }

    /// Set progress and status together, firing one notification
    pub fn push(&self, progress: Progress, status: impl Into<String>) {
        {
            let mut state = self.lock();
            state.progress = clamp(progress);
            state.status = Some(status.into());
        }
        self.changed();
    }

    /// Set progress only
    pub fn set_progress(&self, progress: Progress) {
        self.lock().progress = clamp(progress);
        self.changed();
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.lock().title = Some(title.into());
        self.changed();
    }

    pub fn set_status(&self, status: impl Into<String>) {
        self.lock().status = Some(status.into());
        self.changed();
    }

    pub fn set_must_confirm_cancel(&self, must_confirm: bool) {
        self.lock().must_confirm_cancel = must_confirm;
        self.changed();
    }

    /// Mark this node complete
    pub fn finish(&self, status: impl Into<String>) {
        self.push(Progress::Determinate(1.0), status);
    }

    /// Move to the next slot of a repeated phase
    ///
    /// The offset moves forward by this node's interval, progress restarts at
    /// zero and observers of the previous phase are detached. The parent link
    /// stays in place.
    pub fn advance(&self) {
        {
            let mut state = self.lock();
            state.offset += state.interval;
            state.progress = Progress::Determinate(0.0);
            state.observers.clear();
        }
        self.changed();
    }

    /// Register a callback fired after every change of this node
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&SegmentSnapshot) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let id = ObserverId(state.next_observer);
        state.next_observer += 1;
        state.observers.push((id, Arc::new(observer)));
        id
    }

    /// Remove a previously registered callback
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut state = self.lock();
        let before = state.observers.len();
        state.observers.retain(|(other, _)| *other != id);
        state.observers.len() != before
    }

    pub fn snapshot(&self) -> SegmentSnapshot {
        self.lock().snapshot()
    }

    pub fn progress(&self) -> Progress {
        self.lock().progress
    }

    pub fn title(&self) -> Option<String> {
        self.lock().title.clone()
    }

    pub fn status(&self) -> Option<String> {
        self.lock().status.clone()
    }

    pub fn must_confirm_cancel(&self) -> bool {
        self.lock().must_confirm_cancel
    }

    /// Sum of shares handed out to children so far
    pub fn total(&self) -> f64 {
        self.lock().total
    }

    fn changed(&self) {
        let (snapshot, observers) = {
            let state = self.lock();
            let observers: Vec<Observer> = state.observers.iter().map(|(_, o)| o.clone()).collect();
            (state.snapshot(), observers)
        };

        for observer in observers {
            observer(&snapshot);
        }

        if let Some(parent) = &self.inner.parent {
            parent.child_changed(&snapshot);
        }
    }

    fn child_changed(&self, child: &SegmentSnapshot) {
        {
            let mut state = self.lock();
            if let Progress::Determinate(value) = child.progress {
                if child.percentage > 0.0 && state.total > 0.0 {
                    let aggregate = (value * child.percentage + child.offset) / state.total;
                    state.progress = Progress::Determinate(aggregate.clamp(0.0, 1.0));
                }
            }
            if child.title.is_some() {
                state.title = child.title.clone();
            }
            if child.status.is_some() {
                state.status = child.status.clone();
            }
            state.must_confirm_cancel = child.must_confirm_cancel;
        }
        self.changed();
    }
}

fn clamp(progress: Progress) -> Progress {
    match progress {
        Progress::Determinate(v) if v.is_nan() => Progress::Indeterminate,
        Progress::Determinate(v) => Progress::Determinate(v.clamp(0.0, 1.0)),
        other => other,
    }
}
