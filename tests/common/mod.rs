//! Shared fixtures for integration tests
//!
//! A [`FakeFetch`] serves feed documents and enclosure bytes from memory so
//! whole passes run without a network, against a temporary media root.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use castkeeper::app::client::{write_atomically, DownloadOutcome, Fetch};
use castkeeper::app::context::{Feed, RunContext, RunSettings};
use castkeeper::app::repository::RepositoryFactory;
use castkeeper::app::MemoryStore;
use castkeeper::config::FeedConfig;
use castkeeper::errors::{DownloadError, DownloadResult};

pub const FEED_URL: &str = "https://example.com/feed.xml";

/// In-memory stand-in for the network
#[derive(Default)]
pub struct FakeFetch {
    documents: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeFetch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `document` at `url` from now on
    pub fn serve(&self, url: &str, document: impl Into<String>) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document.into());
    }

    /// Every URL requested so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of enclosure and image downloads so far
    pub fn downloads(&self) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.as_str() != FEED_URL)
            .count()
    }
}

#[async_trait]
impl Fetch for FakeFetch {
    async fn fetch_text(&self, url: &str) -> DownloadResult<String> {
        self.requests.lock().unwrap().push(url.to_string());
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::ServerError {
                status: 404,
                url: url.to_string(),
            })
    }

    async fn fetch_to_file(&self, url: &str, destination: &Path) -> DownloadResult<DownloadOutcome> {
        self.requests.lock().unwrap().push(url.to_string());
        if url.contains("missing") {
            return Err(DownloadError::ServerError {
                status: 404,
                url: url.to_string(),
            });
        }
        let body = format!("bytes of {}", url);
        write_atomically(destination, body.as_bytes())?;
        Ok(DownloadOutcome {
            bytes: body.len() as u64,
            cd_filename: None,
        })
    }
}

/// Everything a pass needs, rooted in a temporary directory
pub struct Harness {
    pub temp_dir: TempDir,
    pub store: MemoryStore,
    pub fetch: Arc<FakeFetch>,
    pub settings: RunSettings,
    pub now: DateTime<Utc>,
}

impl Harness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let settings = RunSettings {
            media_root: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        Self {
            temp_dir,
            store: MemoryStore::new(),
            fetch: FakeFetch::new(),
            settings,
            now: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    pub fn context(&self) -> RunContext {
        let repositories: Arc<dyn RepositoryFactory> = Arc::new(self.store.clone());
        RunContext::new(self.settings.clone(), repositories, self.fetch.clone()).with_now(self.now)
    }

    pub fn feed(&self, template: &str) -> Feed {
        let mut config = FeedConfig::new("Foo Show", "foo", FEED_URL);
        config.filename_parse = template.to_string();
        config.resolve(&self.settings).unwrap()
    }
}

/// One `<item>` of a test feed
pub struct TestItem {
    pub guid: &'static str,
    pub url: String,
    pub title: String,
    pub pub_date: &'static str,
    pub image: Option<String>,
}

impl TestItem {
    pub fn new(guid: &'static str, url: &str, title: &str, pub_date: &'static str) -> Self {
        Self {
            guid,
            url: url.to_string(),
            title: title.to_string(),
            pub_date,
            image: None,
        }
    }

    pub fn with_image(mut self, url: &str) -> Self {
        self.image = Some(url.to_string());
        self
    }
}

/// RSS document with the given channel dates and items (newest first)
pub fn rss(build_date: &str, items: &[TestItem]) -> String {
    let mut body = String::new();
    for item in items {
        let image = item
            .image
            .as_ref()
            .map(|url| format!(r#"<itunes:image href="{}"/>"#, url))
            .unwrap_or_default();
        body.push_str(&format!(
            r#"<item>
  <title>{}</title>
  <guid isPermaLink="false">{}</guid>
  <pubDate>{}</pubDate>
  <enclosure url="{}" length="1000" type="audio/mpeg"/>
  {}
</item>
"#,
            item.title, item.guid, item.pub_date, item.url, image
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
<channel>
<title>Foo Show</title>
<link>https://example.com/</link>
<lastBuildDate>{}</lastBuildDate>
<itunes:image href="https://example.com/cover.jpg"/>
{}</channel>
</rss>"#,
        build_date, body
    )
}
