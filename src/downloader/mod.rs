//! Resource providers for wendeploy
//!
//! The deployment engine never talks to the network or the filesystem source
//! directly; it asks a `ResourceProvider` to place an artifact's bytes in a
//! staging file.

pub mod base;
pub mod http;
pub mod local;

// Re-export commonly used items
pub use base::{ResourceProvider, ResourceRequest};
pub use http::HttpResourceProvider;
pub use local::LocalResourceProvider;

use crate::error::{DeployError, Result};
use crate::utils::HttpClient;
use std::path::Path;
use std::time::Duration;

/// Connection settings for providers built by `provider_for`
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

/// Pick a provider for `location` by its scheme
pub fn provider_for(location: &str, options: &ProviderOptions) -> Result<Box<dyn ResourceProvider>> {
    if is_remote(location) {
        let http = HttpClient::with_options(
            options.timeout.unwrap_or(crate::utils::http::DEFAULT_TIMEOUT),
            options.user_agent.as_deref(),
        )
        .map_err(|e| DeployError::config(format!("{:#}", e)))?;
        return Ok(Box::new(HttpResourceProvider::new(http)));
    }

    if location.contains("://") && !location.starts_with("file://") {
        return Err(DeployError::config(format!(
            "Unsupported location scheme: {}",
            location
        )));
    }

    Ok(Box::new(LocalResourceProvider::new()))
}

/// Whether `location` is an HTTP(S) URL
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Append a relative path to a base location
pub fn join_location(base: &str, relative: &str) -> String {
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
        return relative.to_string();
    }
    if relative.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches(['/', '\\']), relative)
}

/// Location containing the document at `location`
pub fn parent_location(location: &str) -> String {
    if location.contains("://") {
        match location.trim_end_matches('/').rsplit_once('/') {
            Some((parent, _)) if parent.ends_with('/') || parent.ends_with(':') => {
                location.to_string()
            }
            Some((parent, _)) => parent.to_string(),
            None => location.to_string(),
        }
    } else {
        Path::new(location)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Resolve a manifest-relative location against the manifest's own location
///
/// Absolute URLs and absolute paths are returned unchanged; `None` resolves to
/// the manifest's directory.
pub fn resolve_location(manifest_location: &str, relative: Option<&str>) -> String {
    let base = parent_location(manifest_location);
    match relative {
        None => base,
        Some(rel) if rel.contains("://") || Path::new(rel).is_absolute() => rel.to_string(),
        Some(rel) => join_location(&base, rel),
    }
}
