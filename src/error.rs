//! Error types for deployment passes and scheduled tasks

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type used across the deployment engine
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors raised while building, fetching or deploying artifacts
#[derive(Error, Debug)]
pub enum DeployError {
    /// Network or storage failure while obtaining an artifact (retryable)
    #[error("failed to fetch {key}: {reason}")]
    Fetch { key: String, reason: String },

    /// Fetched content does not match the declared signature
    #[error("integrity check failed for {key}: expected {expected}, got {actual}")]
    Integrity {
        key: String,
        expected: String,
        actual: String,
    },

    /// Write or extraction failure; fatal for the current pass
    #[error("failed to deploy {key} to {}: {reason}", path.display())]
    Deployment {
        key: String,
        path: PathBuf,
        reason: String,
    },

    /// The task was cancelled on purpose
    #[error("cancelled by caller")]
    Cancelled,

    /// Malformed manifest, rule or configuration; the pass never starts
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A scheduled task panicked instead of returning
    #[error("task '{0}' panicked")]
    Panicked(String),

    /// IO error outside of a specific artifact
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Create a fetch failure for an artifact
    pub fn fetch(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a deployment failure for an artifact path
    pub fn deployment(key: impl Into<String>, path: &Path, reason: impl ToString) -> Self {
        Self::Deployment {
            key: key.into(),
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Create a configuration failure
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error aborts the whole pass rather than a single artifact
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Fetch { .. } | Self::Integrity { .. })
    }

    /// Whether the caller stopped the work on purpose
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Artifact key this error refers to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Fetch { key, .. } | Self::Integrity { key, .. } | Self::Deployment { key, .. } => {
                Some(key)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!DeployError::fetch("a", "timeout").is_fatal());
        assert!(!DeployError::Integrity {
            key: "a".into(),
            expected: "x".into(),
            actual: "y".into(),
        }
        .is_fatal());
        assert!(DeployError::deployment("a", Path::new("/tmp/a"), "denied").is_fatal());
        assert!(DeployError::Cancelled.is_fatal());
        assert!(DeployError::config("bad").is_fatal());
    }

    #[test]
    fn test_key() {
        assert_eq!(DeployError::fetch("lib/a.jar", "404").key(), Some("lib/a.jar"));
        assert_eq!(DeployError::Cancelled.key(), None);
        assert!(DeployError::Cancelled.is_cancelled());
    }
}
