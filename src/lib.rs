//! wendeploy - manifest-driven content deployment
//!
//! Builds packages from a source tree, deploys them into an install
//! directory, and tracks every pass as a cancellable task with weighted
//! progress.

pub mod builder;
pub mod cache;
pub mod core;
pub mod downloader;
pub mod error;
pub mod installer;
pub mod progress;
pub mod signature;
pub mod utils;

// Re-export commonly used items
pub use error::{DeployError, Result};
