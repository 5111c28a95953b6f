//! Local directory provider
//!
//! Serves plain paths and `file://` URLs, used for packages built to disk
//! and for mirrors on shared drives.

use super::base::{stream_to_file, ResourceProvider, ResourceRequest};
use crate::error::{DeployError, Result};
use crate::progress::{CancelToken, Segment};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Provider reading from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalResourceProvider;

impl LocalResourceProvider {
    pub fn new() -> Self {
        Self
    }

    /// Filesystem path of a local location
    pub fn path_of(location: &str) -> PathBuf {
        PathBuf::from(location.strip_prefix("file://").unwrap_or(location))
    }
}

impl ResourceProvider for LocalResourceProvider {
    fn fetch(
        &self,
        request: &ResourceRequest,
        dest: &Path,
        segment: &Segment,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let source = Self::path_of(&request.location);
        log::debug!("Copying {} to {}", source.display(), dest.display());

        let file = File::open(&source).map_err(|e| {
            DeployError::fetch(
                &request.key,
                format!("cannot open {}: {}", source.display(), e),
            )
        })?;
        let total = file.metadata().map(|m| m.len()).ok();

        stream_to_file(
            request,
            &mut BufReader::new(file),
            total,
            dest,
            segment,
            cancel,
        )
    }

    fn can_handle(&self, location: &str) -> bool {
        !location.contains("://") || location.starts_with("file://")
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_can_handle() {
        let provider = LocalResourceProvider::new();
        assert!(provider.can_handle("/srv/objects/a.jar"));
        assert!(provider.can_handle("file:///srv/objects/a.jar"));
        assert!(!provider.can_handle("https://cdn.example.com/a.jar"));
    }

    #[test]
    fn test_fetch_file_url() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.bin");
        fs::write(&source, b"content").unwrap();
        let dest = temp.path().join("a.bin.tmp");

        let location = format!("file://{}", source.display());
        let written = LocalResourceProvider
            .fetch(
                &ResourceRequest::new("a.bin", location),
                &dest,
                &Segment::root(),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(written, 7);
        assert_eq!(fs::read(dest).unwrap(), b"content");
    }

    #[test]
    fn test_missing_source_is_fetch_failure() {
        let temp = TempDir::new().unwrap();
        let result = LocalResourceProvider.fetch(
            &ResourceRequest::new("gone", temp.path().join("gone").display().to_string()),
            &temp.path().join("gone.tmp"),
            &Segment::root(),
            &CancelToken::new(),
        );
        let err = result.unwrap_err();
        assert!(matches!(err, DeployError::Fetch { .. }));
        assert!(!err.is_fatal());
    }
}
