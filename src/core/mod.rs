//! Core modules for wendeploy

pub mod config;
pub mod library;
pub mod manifest;
pub mod paths;
pub mod platform;
pub mod repair;

// Re-export commonly used items
pub use config::DeployConfig;
pub use library::{Coordinate, Library, Rule, RuleAction};
pub use manifest::{
    ArchiveFile, Component, FileGroup, OverwritePolicy, PackageFile, PackageManifest, SingleFile,
    VerifyMethod,
};
pub use paths::DeployPaths;
pub use platform::{Arch, Environment, Os};
