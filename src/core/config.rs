//! Deployment configuration
//!
//! Settings are stored in config.toml and threaded explicitly through the
//! commands; nothing here is process-global.

use super::platform::{Environment, Os};
use crate::progress::DEFAULT_THREADS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_timeout() -> u64 {
    30
}

/// Settings for deployment passes, stored in config.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Default install directory when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,

    /// Override for the manifest's objects location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects_location: Option<String>,

    /// Override for the manifest's libraries location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub libraries_location: Option<String>,

    /// Worker threads for scheduled tasks
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout")]
    pub http_timeout_secs: u64,

    /// User agent sent with HTTP requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// OS override for platform filters and library rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Os>,

    /// OS version override for library rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,

    /// Components to select in addition to the manifest defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,

    /// Components to deselect (required components stay selected)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deselect: Vec<String>,

    /// Keep files whose artifacts left the manifest
    #[serde(default)]
    pub keep_orphans: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            objects_location: None,
            libraries_location: None,
            threads: default_threads(),
            http_timeout_secs: default_timeout(),
            user_agent: None,
            os: None,
            os_version: None,
            select: Vec::new(),
            deselect: Vec::new(),
            keep_orphans: false,
        }
    }
}

impl DeployConfig {
    /// Load configuration from config.toml
    ///
    /// Returns defaults if the file doesn't exist.
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to config.toml
    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))
    }

    /// Generate a default config.toml with helpful comments
    pub fn generate_default_file(config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let template = r#"# wendeploy configuration file
#
# Every setting is optional; command line flags take precedence.

# Install directory used when --dest is not given
# install_dir = "/opt/games/demo"

# Override where file group objects and libraries are fetched from.
# Accepts http(s) URLs, file:// URLs or local directories.
# objects_location = "https://cdn.example.com/demo/objects"
# libraries_location = "https://libraries.example.com"

# Worker threads used for scheduled tasks
threads = 4

# HTTP timeout in seconds
http_timeout_secs = 30

# User agent for HTTP requests (defaults to wendeploy/<version>)
# user_agent = "my-launcher/1.0"

# Platform overrides for manifest filters and library rules
# os = "linux"
# os_version = "6.1.0"

# Optional components to select or deselect
# select = ["hd"]
# deselect = ["music"]

# Keep files whose artifacts were removed from the manifest
keep_orphans = false
"#;

        fs::write(config_path, template)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))
    }

    /// Validate configuration
    ///
    /// Checks that:
    /// - At least one worker thread is configured
    /// - The install directory, when set, is absolute
    /// - A component is not both selected and deselected
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            anyhow::bail!("threads must be at least 1");
        }

        if let Some(ref dir) = self.install_dir {
            if !dir.is_absolute() {
                anyhow::bail!("install_dir must be absolute, got: {}", dir.display());
            }
        }

        if let Some(id) = self.select.iter().find(|id| self.deselect.contains(id)) {
            anyhow::bail!("Component '{}' is both selected and deselected", id);
        }

        Ok(())
    }

    /// Environment with configured overrides applied
    pub fn environment(&self) -> Environment {
        let mut env = Environment::detect();
        if let Some(os) = self.os {
            env.os = os;
        }
        if let Some(ref version) = self.os_version {
            env.os_version = version.clone();
        }
        env
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = DeployConfig::load(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config, DeployConfig::default());
        assert_eq!(config.threads, DEFAULT_THREADS);
    }

    #[test]
    fn test_default_template_parses() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        DeployConfig::generate_default_file(&path).unwrap();
        let config = DeployConfig::load(&path).unwrap();
        assert_eq!(config.threads, 4);
        assert!(!config.keep_orphans);
    }

    #[test]
    fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.toml");
        let config = DeployConfig {
            os: Some(Os::Linux),
            select: vec!["hd".into()],
            threads: 8,
            ..DeployConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DeployConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validate() {
        let config = DeployConfig {
            threads: 0,
            ..DeployConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DeployConfig {
            install_dir: Some(PathBuf::from("relative/dir")),
            ..DeployConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DeployConfig {
            select: vec!["hd".into()],
            deselect: vec!["hd".into()],
            ..DeployConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let config = DeployConfig {
            os: Some(Os::Windows),
            os_version: Some("10.0".into()),
            ..DeployConfig::default()
        };
        let env = config.environment();
        assert_eq!(env.os, Os::Windows);
        assert_eq!(env.os_version, "10.0");
    }
}
