//! HTTP(S) provider

use super::base::{stream_to_file, ResourceProvider, ResourceRequest};
use crate::error::{DeployError, Result};
use crate::progress::{CancelToken, Segment};
use crate::utils::HttpClient;
use std::path::Path;

/// Provider downloading over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpResourceProvider {
    http: HttpClient,
}

impl HttpResourceProvider {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl ResourceProvider for HttpResourceProvider {
    fn fetch(
        &self,
        request: &ResourceRequest,
        dest: &Path,
        segment: &Segment,
        cancel: &CancelToken,
    ) -> Result<u64> {
        log::info!("Downloading: {}", request.location);
        cancel.check()?;

        let mut response = self
            .http
            .get(&request.location)
            .map_err(|e| DeployError::fetch(&request.key, format!("{:#}", e)))?;
        let total = response.content_length();

        stream_to_file(request, &mut response, total, dest, segment, cancel)
    }

    fn can_handle(&self, location: &str) -> bool {
        location.starts_with("http://") || location.starts_with("https://")
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_can_handle() {
        let provider = HttpResourceProvider::new(HttpClient::new().unwrap());
        assert!(provider.can_handle("https://cdn.example.com/a.jar"));
        assert!(!provider.can_handle("/srv/a.jar"));
        assert_eq!(provider.name(), "http");
    }

    #[test]
    #[ignore] // Requires network access
    fn test_fetch_bytes() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("bytes.tmp");
        let provider = HttpResourceProvider::new(HttpClient::new().unwrap());

        let written = provider
            .fetch(
                &ResourceRequest::new("bytes", "https://httpbin.org/bytes/1024"),
                &dest,
                &Segment::root(),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(written, 1024);
    }

    #[test]
    fn test_cancelled_before_request() {
        let temp = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let provider = HttpResourceProvider::new(HttpClient::new().unwrap());

        let result = provider.fetch(
            &ResourceRequest::new("x", "https://cdn.invalid/x"),
            &temp.path().join("x.tmp"),
            &Segment::root(),
            &cancel,
        );
        assert!(matches!(result, Err(DeployError::Cancelled)));
    }
}
