//! HTTP client utilities for wendeploy

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client wrapper
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default timeout (30 seconds)
    pub fn new() -> Result<Self> {
        Self::with_options(DEFAULT_TIMEOUT, None)
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::with_options(timeout, None)
    }

    /// Create a new HTTP client with custom timeout and user agent
    pub fn with_options(timeout: Duration, user_agent: Option<&str>) -> Result<Self> {
        let user_agent = user_agent
            .map(str::to_string)
            .unwrap_or_else(|| format!("wendeploy/{}", env!("CARGO_PKG_VERSION")));

        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Send a GET request and return the response as text
    pub fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url)?;
        let text = response
            .text()
            .context("Failed to read response body as text")?;
        Ok(text)
    }

    /// Send a GET request and return the response for streaming
    ///
    /// Fails on non-success status codes.
    pub fn get(&self, url: &str) -> Result<Response> {
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP {} for {}", response.status(), url);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        assert!(HttpClient::new().is_ok());
        assert!(HttpClient::with_options(Duration::from_secs(5), Some("test-agent")).is_ok());
    }

    #[test]
    #[ignore] // Requires network access
    fn test_get_text() {
        let client = HttpClient::new().unwrap();
        let text = client.get_text("https://httpbin.org/get");
        assert!(text.is_ok());
    }
}
