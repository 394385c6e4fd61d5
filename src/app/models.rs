//! Data models for Castkeeper
//!
//! This module defines the persisted records (feed state, items, images) and
//! the verbatim channel/item metadata captured from feed documents. The
//! metadata is kept alongside each record so filenames can be regenerated
//! without refetching the feed.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::app::hash::ItemHash;

/// Downloadable media reference attached to an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    /// Declared length in bytes (0 when missing or unparseable)
    pub length: u64,
    pub mime_type: String,
}

/// `podcast:person` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub role: Option<String>,
    pub group: Option<String>,
    pub href: Option<String>,
    pub img: Option<String>,
}

/// `atom:link` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomLink {
    pub href: String,
    pub rel: Option<String>,
    pub link_type: Option<String>,
}

/// `podcast:funding` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funding {
    pub url: String,
    pub text: String,
}

/// RSS `<image>` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelImage {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
}

/// Channel-level metadata as found in the feed document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelXml {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub generator: Option<String>,
    pub pub_date: Option<String>,
    pub last_build_date: Option<String>,
    pub image: Option<ChannelImage>,
    pub itunes_image: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub itunes_type: Option<String>,
    pub explicit: Option<String>,
    pub categories: Vec<String>,
    pub new_feed_url: Option<String>,
    pub atom_links: Vec<AtomLink>,
    pub podcast_guid: Option<String>,
    pub locked: Option<String>,
    pub funding: Vec<Funding>,
}

impl ChannelXml {
    /// URL of the feed's primary artwork, preferring `itunes:image`
    pub fn primary_image_url(&self) -> Option<&str> {
        self.itunes_image
            .as_deref()
            .or_else(|| self.image.as_ref().map(|image| image.url.as_str()))
            .filter(|url| !url.is_empty())
    }
}

/// Item-level metadata as found in the feed document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemXml {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
    pub content_encoded: Option<String>,
    pub guid: Option<String>,
    pub guid_is_permalink: Option<bool>,
    pub pub_date: Option<String>,
    /// `pub_date` parsed leniently; `None` when absent or unreadable
    pub pub_time: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub enclosure: Option<Enclosure>,
    pub episode: Option<String>,
    pub season: Option<String>,
    pub episode_type: Option<String>,
    pub duration: Option<String>,
    pub explicit: Option<String>,
    pub image: Option<String>,
    pub subtitle: Option<String>,
    pub summary: Option<String>,
    pub podcast_episode: Option<String>,
    pub podcast_season: Option<String>,
    pub persons: Vec<Person>,
}

impl ItemXml {
    /// Upstream episode number, `itunes:episode` first
    pub fn episode_number(&self) -> Option<&str> {
        self.episode
            .as_deref()
            .or(self.podcast_episode.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Upstream season number, `itunes:season` first
    pub fn season_number(&self) -> Option<&str> {
        self.season
            .as_deref()
            .or(self.podcast_season.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Enclosure URL if present and non-empty
    pub fn enclosure_url(&self) -> Option<&str> {
        self.enclosure
            .as_ref()
            .map(|enclosure| enclosure.url.trim())
            .filter(|url| !url.is_empty())
    }

    /// Guid used for identity: the upstream guid, or the raw enclosure URL
    /// when the item has none
    pub fn identity_guid(&self) -> Option<&str> {
        self.guid
            .as_deref()
            .map(str::trim)
            .filter(|guid| !guid.is_empty())
            .or_else(|| self.enclosure_url())
    }

    /// Episode image, if the item carries its own
    pub fn image_url(&self) -> Option<&str> {
        self.image.as_deref().filter(|url| !url.is_empty())
    }
}

/// Persisted per-feed state
///
/// The display name, URL, template and paths come from configuration; this
/// record holds what the pipeline learns and mutates across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub id: Option<i64>,
    pub shortname: String,
    /// Last sequence number handed out to a new item
    pub episode_count: i64,
    pub last_pub_date: Option<DateTime<Utc>>,
    pub last_build_date: Option<DateTime<Utc>>,
    pub channel: Option<ChannelXml>,
}

impl FeedRecord {
    /// Fresh record for a feed seen for the first time
    pub fn new(shortname: impl Into<String>) -> Self {
        Self {
            id: None,
            shortname: shortname.into(),
            episode_count: 0,
            last_pub_date: None,
            last_build_date: None,
            channel: None,
        }
    }

    /// Hand out the next sequence number
    pub fn next_count(&mut self) -> i64 {
        self.episode_count += 1;
        self.episode_count
    }
}

/// One episode as tracked across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Option<i64>,
    pub hash: ItemHash,
    pub guid: String,
    /// Normalized enclosure URL
    pub url: String,
    pub filename: String,
    /// Collision suffix chosen when the filename was first rendered
    pub filename_suffix: Option<char>,
    /// Sequence number assigned on first sighting
    pub episode_count: i64,
    pub downloaded: bool,
    pub archived: bool,
    /// Filename advertised by the server's Content-Disposition header
    pub cd_filename: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub xml: ItemXml,
}

impl Item {
    /// Publication year, if known
    pub fn pub_year(&self) -> Option<i32> {
        self.pub_date.map(|date| date.year())
    }

    /// Short label for log lines
    pub fn label(&self) -> String {
        if self.xml.title.is_empty() {
            self.guid.clone()
        } else {
            self.xml.title.clone()
        }
    }
}

/// Artwork file tracked for a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Option<i64>,
    pub url: String,
    pub filename: String,
    pub downloaded: bool,
    pub archived: bool,
}

impl ImageRecord {
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            filename: filename.into(),
            downloaded: false,
            archived: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_count_increments() {
        let mut record = FeedRecord::new("foo");
        assert_eq!(record.next_count(), 1);
        assert_eq!(record.next_count(), 2);
        assert_eq!(record.episode_count, 2);
    }

    #[test]
    fn test_identity_guid_falls_back_to_enclosure() {
        let mut xml = ItemXml {
            enclosure: Some(Enclosure {
                url: "https://example.com/a.mp3".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(xml.identity_guid(), Some("https://example.com/a.mp3"));

        xml.guid = Some("  ".to_string());
        assert_eq!(xml.identity_guid(), Some("https://example.com/a.mp3"));

        xml.guid = Some("g1".to_string());
        assert_eq!(xml.identity_guid(), Some("g1"));
    }

    #[test]
    fn test_episode_number_prefers_itunes() {
        let xml = ItemXml {
            episode: Some("7".to_string()),
            podcast_episode: Some("8".to_string()),
            ..Default::default()
        };
        assert_eq!(xml.episode_number(), Some("7"));

        let podcast_only = ItemXml {
            podcast_episode: Some("8".to_string()),
            ..Default::default()
        };
        assert_eq!(podcast_only.episode_number(), Some("8"));
    }

    #[test]
    fn test_primary_image_prefers_itunes() {
        let channel = ChannelXml {
            itunes_image: Some("https://example.com/itunes.jpg".to_string()),
            image: Some(ChannelImage {
                url: "https://example.com/rss.jpg".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            channel.primary_image_url(),
            Some("https://example.com/itunes.jpg")
        );
    }

    #[test]
    fn test_item_pub_year() {
        let item = Item {
            id: None,
            hash: ItemHash::compute("g", "u"),
            guid: "g".to_string(),
            url: "u".to_string(),
            filename: "a.mp3".to_string(),
            filename_suffix: None,
            episode_count: 1,
            downloaded: false,
            archived: false,
            cd_filename: None,
            pub_date: Some(Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap()),
            xml: ItemXml::default(),
        };
        assert_eq!(item.pub_year(), Some(2021));
        assert_eq!(item.label(), "g");
    }
}
