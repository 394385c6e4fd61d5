//! HTTP client for feed documents, enclosures and artwork
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations
//! - `download`: File download operations with atomic writes
//!
//! The pipeline talks to the network only through the [`Fetch`] trait so
//! passes can be driven by an in-process fake in tests.

use std::path::Path;

use async_trait::async_trait;

use crate::errors::DownloadResult;

pub mod config;
pub mod download;
pub mod http;

pub use config::ClientConfig;
pub use download::{
    content_disposition_filename, install_atomically, write_atomically, DownloadOutcome,
};

use download::DownloadHandler;
use http::{parse_url, HttpHandler};

/// Network access used by the pipeline
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch a document as text
    async fn fetch_text(&self, url: &str) -> DownloadResult<String>;

    /// Download to `destination` atomically
    async fn fetch_to_file(&self, url: &str, destination: &Path)
        -> DownloadResult<DownloadOutcome>;
}

/// `reqwest`-backed [`Fetch`] implementation
#[derive(Debug, Clone)]
pub struct FeedClient {
    http_handler: HttpHandler,
}

impl FeedClient {
    /// Creates a client with default configuration
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if HTTP client creation fails
    pub fn new() -> DownloadResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client with custom configuration
    pub fn with_config(config: ClientConfig) -> DownloadResult<Self> {
        let client = config.build_http_client()?;
        tracing::debug!("Created HTTP client: {:?}", config);
        Ok(Self {
            http_handler: HttpHandler::new(client),
        })
    }
}

#[async_trait]
impl Fetch for FeedClient {
    async fn fetch_text(&self, url: &str) -> DownloadResult<String> {
        let url = parse_url(url)?;
        self.http_handler.get_text(&url).await
    }

    async fn fetch_to_file(
        &self,
        url: &str,
        destination: &Path,
    ) -> DownloadResult<DownloadOutcome> {
        let url = parse_url(url)?;
        DownloadHandler::new(&self.http_handler)
            .download_file(&url, destination)
            .await
    }
}
