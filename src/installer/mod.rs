//! Installer module for wendeploy
//!
//! Turns fetched artifacts into files on disk and keeps track of them.

pub mod cleaner;
pub mod deploy;
pub mod engine;
pub mod extractor;
pub mod filters;
pub mod uninstall_log;

// Re-export commonly used items
pub use cleaner::{remove_orphans, uninstall_all, CleanSummary};
pub use deploy::{DeployContext, DeployOutcome};
pub use engine::{ComponentSelection, DeployReport, DeploymentEngine};
pub use extractor::{extract_zip, ExtractOptions, ExtractSummary};
pub use filters::{decode_chain, FilterProvider, StandardFilters};
pub use uninstall_log::UninstallLog;
