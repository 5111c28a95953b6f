//! Hierarchical progress tracking and task scheduling

pub mod cancel;
pub mod display;
pub mod executor;
pub mod segment;
pub mod service;
pub mod worker;

// Re-export commonly used items
pub use cancel::CancelToken;
pub use display::attach_progress_bar;
pub use executor::{WorkerExecutor, DEFAULT_THREADS};
pub use segment::{ObserverId, Progress, Segment, SegmentSnapshot};
pub use service::{ServiceSnapshot, TaskSummary, WorkerService};
pub use worker::{Task, TaskId, WorkContext, Worker};
