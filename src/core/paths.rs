//! Path management for wendeploy
//!
//! Deployment state lives inside the install directory so that one install
//! directory is self-describing:
//! - State directory: <install>/.wendeploy/
//! - Version cache: <install>/.wendeploy/cache.json
//! - Uninstall log: <install>/.wendeploy/uninstall.log
//!
//! User configuration lives in the platform config directory
//! (e.g. ~/.config/wendeploy/config.toml).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the state directory inside an install directory
pub const STATE_DIR_NAME: &str = ".wendeploy";

/// Paths of one install directory
#[derive(Debug, Clone)]
pub struct DeployPaths {
    install_dir: PathBuf,
}

impl DeployPaths {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    /// Install directory files are deployed into
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Directory holding the version cache and uninstall log
    pub fn state_dir(&self) -> PathBuf {
        self.install_dir.join(STATE_DIR_NAME)
    }

    pub fn cache_json(&self) -> PathBuf {
        self.state_dir().join("cache.json")
    }

    pub fn uninstall_log(&self) -> PathBuf {
        self.state_dir().join("uninstall.log")
    }

    /// Directory native libraries are extracted into
    pub fn natives_dir(&self) -> PathBuf {
        self.install_dir.join("natives")
    }

    /// Create the install and state directories
    pub fn init_dirs(&self) -> Result<()> {
        let state_dir = self.state_dir();
        fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create directory: {}", state_dir.display()))?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir().is_dir()
    }

    /// Default location of the user configuration file
    pub fn user_config_file() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Failed to determine config directory")?;
        Ok(dir.join("wendeploy").join("config.toml"))
    }
}
