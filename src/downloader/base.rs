//! Base trait for resource providers

use crate::error::{DeployError, Result};
use crate::progress::{CancelToken, Progress, Segment};
use crate::utils::stream::copy_chunked;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

/// One artifact to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// Version cache key, used in errors
    pub key: String,
    /// URL or local path of the content
    pub location: String,
    /// Declared size, used for progress when the source does not report one
    pub expected_size: Option<u64>,
}

impl ResourceRequest {
    pub fn new(key: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            location: location.into(),
            expected_size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.expected_size = (size > 0).then_some(size);
        self
    }
}

/// Trait for resource providers (HTTP, local directory, etc.)
pub trait ResourceProvider: Send + Sync {
    /// Fetch `request` into `dest`, reporting progress on `segment`
    ///
    /// Returns the number of bytes written. Failures to obtain the content
    /// are `DeployError::Fetch`; cancellation is `DeployError::Cancelled`.
    fn fetch(
        &self,
        request: &ResourceRequest,
        dest: &Path,
        segment: &Segment,
        cancel: &CancelToken,
    ) -> Result<u64>;

    /// Check if this provider can handle the given location
    fn can_handle(&self, location: &str) -> bool;

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Stream `reader` into a new file at `dest`
///
/// Shared by the providers: progress is a byte fraction when the total is
/// known, indeterminate otherwise.
pub(crate) fn stream_to_file<R: Read + ?Sized>(
    request: &ResourceRequest,
    reader: &mut R,
    total: Option<u64>,
    dest: &Path,
    segment: &Segment,
    cancel: &CancelToken,
) -> Result<u64> {
    let file = File::create(dest).map_err(|e| {
        DeployError::fetch(&request.key, format!("cannot create {}: {}", dest.display(), e))
    })?;
    let mut writer = BufWriter::new(file);

    let total = total.filter(|t| *t > 0).or(request.expected_size);
    if total.is_none() {
        segment.set_progress(Progress::Indeterminate);
    }

    let written = copy_chunked(
        reader,
        &mut writer,
        cancel,
        |done| {
            if let Some(total) = total {
                segment.set_progress(Progress::fraction(done, total));
            }
        },
        |e| DeployError::fetch(&request.key, e),
    )?;

    segment.set_progress(Progress::Determinate(1.0));
    log::debug!("Fetched {} bytes for {}", written, request.key);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_request_size() {
        let request = ResourceRequest::new("k", "loc").with_size(0);
        assert_eq!(request.expected_size, None);
        let request = ResourceRequest::new("k", "loc").with_size(10);
        assert_eq!(request.expected_size, Some(10));
    }

    #[test]
    fn test_stream_to_file_progress() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.tmp");
        let segment = Segment::root();
        let data = vec![1u8; 20_000];

        let written = stream_to_file(
            &ResourceRequest::new("k", "mem"),
            &mut Cursor::new(&data),
            Some(data.len() as u64),
            &dest,
            &segment,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(written, 20_000);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
        assert_eq!(segment.progress(), Progress::Determinate(1.0));
    }

    #[test]
    fn test_stream_to_missing_dir_is_fetch_failure() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("missing/out.tmp");
        let result = stream_to_file(
            &ResourceRequest::new("k", "mem"),
            &mut Cursor::new(vec![1u8]),
            None,
            &dest,
            &Segment::root(),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(DeployError::Fetch { .. })));
    }
}
