//! Command implementations for wendeploy

pub mod build;
pub mod clean;
pub mod deploy;
pub mod init;
pub mod signature;
pub mod status;

// Re-export command functions
pub use build::run as run_build;
pub use clean::run as run_clean;
pub use deploy::run as run_deploy;
pub use init::run as run_init;
pub use signature::run as run_signature;
pub use status::run as run_status;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use wendeploy::core::{DeployConfig, DeployPaths};

/// Load the configuration from `path`, or from the user config directory
pub fn load_config(path: Option<&Path>) -> Result<DeployConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => DeployPaths::user_config_file()?,
    };
    log::debug!("Using configuration {}", path.display());
    DeployConfig::load(&path)
}

/// Install directory from the command line, else from the configuration
pub fn install_paths(dest: Option<PathBuf>, config: &DeployConfig) -> Result<DeployPaths> {
    let dir = dest
        .or_else(|| config.install_dir.clone())
        .context("No install directory given; pass --dest or set install_dir in the config")?;
    Ok(DeployPaths::new(dir))
}
