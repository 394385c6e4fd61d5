//! HTTP client settings
//!
//! Podcast enclosures are usually served behind one or more measurement
//! prefixes (podtrac, chartable and the like) that answer with redirects, so
//! the redirect budget is part of the configuration. Feed documents are
//! requested with an `Accept` header preferring RSS.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::constants::http;
use crate::errors::{DownloadError, DownloadResult};

/// Accept header sent with every request
const ACCEPT_FEEDS: &str = "application/rss+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8";

/// Runtime settings for [`FeedClient`](super::FeedClient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Whole-request timeout; covers the full enclosure transfer
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Redirect hops followed before giving up
    pub max_redirects: usize,
    pub tcp_nodelay: bool,
    /// None disables keep-alive probes
    pub tcp_keepalive: Option<Duration>,
    /// None keeps idle connections open indefinitely
    pub pool_idle_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            max_redirects: http::MAX_REDIRECTS,
            tcp_nodelay: true,
            tcp_keepalive: Some(http::TCP_KEEPALIVE),
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
        }
    }
}

impl ClientConfig {
    /// Settings expressed in whole seconds, as they appear in the config file
    pub fn from_secs(request_timeout: u64, connect_timeout: u64) -> Self {
        Self {
            request_timeout: Duration::from_secs(request_timeout),
            connect_timeout: Duration::from_secs(connect_timeout),
            ..Default::default()
        }
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_FEEDS));
        headers
    }

    /// Build the `reqwest` client
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Http` when the TLS backend cannot be
    /// initialised
    pub fn build_http_client(&self) -> DownloadResult<Client> {
        let redirects = if self.max_redirects == 0 {
            Policy::none()
        } else {
            Policy::limited(self.max_redirects)
        };

        let mut builder = Client::builder()
            .user_agent(http::USER_AGENT)
            .default_headers(Self::default_headers())
            .redirect(redirects)
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(self.tcp_nodelay);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }
        if let Some(idle) = self.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }

        builder.build().map_err(DownloadError::Http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_tracking_redirects() {
        let config = ClientConfig::default();
        assert_eq!(config.max_redirects, http::MAX_REDIRECTS);
        assert_eq!(config.request_timeout, http::DEFAULT_TIMEOUT);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_from_secs_keeps_other_defaults() {
        let config = ClientConfig::from_secs(60, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.pool_idle_timeout, Some(http::POOL_IDLE_TIMEOUT));
    }

    #[test]
    fn test_accept_header_prefers_rss() {
        let headers = ClientConfig::default_headers();
        let accept = headers.get(ACCEPT).unwrap().to_str().unwrap();
        assert!(accept.starts_with("application/rss+xml"));
    }

    #[test]
    fn test_client_builds_without_redirects() {
        let config = ClientConfig {
            max_redirects: 0,
            tcp_keepalive: None,
            pool_idle_timeout: None,
            ..Default::default()
        };
        assert!(config.build_http_client().is_ok());
    }
}
