//! Core HTTP operations
//!
//! Requests are made once. A failed fetch is reported to the caller, which
//! skips the affected item until the next run.

use reqwest::Client;
use url::Url;

use crate::errors::{DownloadError, DownloadResult};

/// HTTP operations handler
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
}

impl HttpHandler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetches a successful HTTP response
    ///
    /// This method returns the raw `reqwest::Response` for streaming
    /// downloads. Use `get_text()` if you need the body as text.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::ServerError` for non-success statuses and
    /// `DownloadError::Http` when the request itself fails
    pub async fn get_response(&self, url: &Url) -> DownloadResult<reqwest::Response> {
        let response = self.client.get(url.as_str()).send().await?;

        if !response.status().is_success() {
            tracing::debug!("GET {} returned {}", url, response.status());
            return Err(DownloadError::ServerError {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        tracing::debug!("Fetched response: {}", url);
        Ok(response)
    }

    /// Fetches a response body as text
    pub async fn get_text(&self, url: &Url) -> DownloadResult<String> {
        let response = self.get_response(url).await?;
        Ok(response.text().await?)
    }
}

/// Parse a URL into the download error domain
pub fn parse_url(url: &str) -> DownloadResult<Url> {
    Url::parse(url.trim()).map_err(|e| DownloadError::InvalidUrl {
        url: url.to_string(),
        error: e.to_string(),
    })
}
