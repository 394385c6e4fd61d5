//! Configuration management for Castkeeper
//!
//! Configuration is a single TOML file with global `[settings]`, `[client]`
//! and `[logging]` tables and one `[[feed]]` table per subscription. Keys are
//! snake_case; the camelCase spellings used by older configurations are
//! accepted as aliases.
//!
//! ```toml
//! [settings]
//! media_root = "/srv/podcasts"
//! max_dup_checks = 3
//!
//! [[feed]]
//! name = "Example Show"
//! shortname = "example"
//! url = "https://example.com/feed.xml"
//! filename_parse = "#shortname#_#episode#.#ext#"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::context::{Feed, RunSettings};
use crate::app::filename::{FilenameCleaner, FilenameTemplate};
use crate::app::ClientConfig;
use crate::constants::{filenames, files, http, logging, store, update};
use crate::errors::{ConfigError, ConfigResult, Result};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Global run settings
    pub settings: SettingsToml,
    /// HTTP client settings
    pub client: ClientConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Subscribed feeds
    #[serde(rename = "feed", alias = "feeds")]
    pub feeds: Vec<FeedConfig>,
}

/// Global `[settings]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsToml {
    /// Database file (default: user data dir)
    pub database: Option<PathBuf>,
    /// Root for per-feed directories (default: user data dir)
    #[serde(alias = "mediaRoot")]
    pub media_root: Option<PathBuf>,
    /// Consecutive known items before the rest of a feed is skipped; 0 disables
    #[serde(alias = "maxDupChecks")]
    pub max_dup_checks: usize,
    #[serde(alias = "forceUpdate")]
    pub force_update: bool,
    #[serde(alias = "useMostRecentXml")]
    pub use_most_recent_xml: bool,
    /// Items published before this date are never downloaded
    #[serde(alias = "downloadAfter")]
    pub download_after: Option<NaiveDate>,
    #[serde(alias = "markDownloaded")]
    pub mark_downloaded: bool,
    pub simulate: bool,
    #[serde(alias = "doArchive")]
    pub do_archive: bool,
    #[serde(alias = "doRename")]
    pub do_rename: bool,
    #[serde(alias = "doCollision")]
    pub do_collision: bool,
    #[serde(alias = "saveCollision")]
    pub save_collision: bool,
    #[serde(alias = "xmlFilesRetained")]
    pub xml_files_retained: usize,
    #[serde(alias = "filenameReplacement")]
    pub filename_replacement: char,
    #[serde(alias = "maxFilenameLength")]
    pub max_filename_length: usize,
}

impl Default for SettingsToml {
    fn default() -> Self {
        Self {
            database: None,
            media_root: None,
            max_dup_checks: update::DEFAULT_MAX_DUP_CHECKS,
            force_update: false,
            use_most_recent_xml: false,
            download_after: None,
            mark_downloaded: false,
            simulate: false,
            do_archive: false,
            do_rename: false,
            do_collision: false,
            save_collision: false,
            xml_files_retained: update::DEFAULT_XML_FILES_RETAINED,
            filename_replacement: filenames::DEFAULT_REPLACEMENT,
            max_filename_length: filenames::DEFAULT_MAX_LENGTH,
        }
    }
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Redirect hops followed per request (0 = none)
    pub max_redirects: usize,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            tcp_keepalive_secs: Some(http::TCP_KEEPALIVE.as_secs()),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            max_redirects: http::MAX_REDIRECTS,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            max_redirects: self.max_redirects,
            tcp_nodelay: self.tcp_nodelay,
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            ..ClientConfig::from_secs(self.request_timeout_secs, self.connect_timeout_secs)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when no verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// One `[[feed]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub shortname: String,
    pub url: String,
    /// Filename template; empty uses the enclosure's own name
    #[serde(default, alias = "filenameParse")]
    pub filename_parse: String,
    /// Regex applied to titles for `#titleregex:N#`
    #[serde(default)]
    pub regex: Option<String>,
    /// Path marker treated as the canonical host when normalizing URLs
    #[serde(default, alias = "urlParse")]
    pub url_parse: Option<String>,
    #[serde(default, alias = "skipFileTrim")]
    pub skip_file_trim: bool,
    #[serde(default = "default_episode_pad", alias = "episodePad")]
    pub episode_pad: usize,
    /// Feed lists oldest items first
    #[serde(default, alias = "standardChronological")]
    pub standard_chronological: bool,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default, alias = "xmlDirectory")]
    pub xml_directory: Option<PathBuf>,
    #[serde(default, alias = "archiveDirectory")]
    pub archive_directory: Option<PathBuf>,
}

fn default_episode_pad() -> usize {
    filenames::DEFAULT_EPISODE_PAD
}

impl FeedConfig {
    /// Minimal feed entry with defaults for everything optional
    pub fn new(
        name: impl Into<String>,
        shortname: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            shortname: shortname.into(),
            url: url.into(),
            filename_parse: String::new(),
            regex: None,
            url_parse: None,
            skip_file_trim: false,
            episode_pad: filenames::DEFAULT_EPISODE_PAD,
            standard_chronological: false,
            directory: None,
            xml_directory: None,
            archive_directory: None,
        }
    }

    /// Resolve paths and compile the filename template
    pub fn resolve(&self, settings: &RunSettings) -> Result<Feed> {
        let directory = self
            .directory
            .clone()
            .unwrap_or_else(|| settings.media_root.join(&self.shortname));
        let xml_directory = self
            .xml_directory
            .clone()
            .unwrap_or_else(|| directory.join(files::XML_DIR));
        let archive_directory = self.archive_directory.clone().unwrap_or_else(|| {
            settings
                .media_root
                .join(files::ARCHIVE_DIR)
                .join(&self.shortname)
        });

        let template = FilenameTemplate::new(
            self.filename_parse.clone(),
            self.shortname.clone(),
            self.regex.as_deref(),
            self.episode_pad,
            self.skip_file_trim,
            settings.cleaner.clone(),
        )?;

        Ok(Feed {
            name: self.name.clone(),
            shortname: self.shortname.clone(),
            url: self.url.clone(),
            url_rule: self.url_parse.clone().filter(|rule| !rule.is_empty()),
            standard_chronological: self.standard_chronological,
            template,
            directory,
            xml_directory,
            archive_directory,
        })
    }
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit path must exist; otherwise the standard locations are
    /// searched and an empty configuration is returned when none is found.
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path }.into());
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Ok(Self::load_from_file(&path).await?),
            None => {
                debug!("No config file found in standard locations");
                Ok(Self::default())
            }
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from("./castkeeper.toml")];
        if let Some(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Default config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(store::APP_DIR_NAME).join("config.toml"))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })?;

        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Parse configuration text
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check everything that would otherwise fail halfway through a run
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.feeds.is_empty() {
            errors.push("no [[feed]] entries configured".to_string());
        }
        if self.settings.xml_files_retained == 0 {
            errors.push("settings.xml_files_retained must be at least 1".to_string());
        }
        if self.settings.max_filename_length < 16 {
            errors.push("settings.max_filename_length must be at least 16".to_string());
        }

        let mut seen = HashSet::new();
        for feed in &self.feeds {
            let label = if feed.shortname.is_empty() {
                feed.name.as_str()
            } else {
                feed.shortname.as_str()
            };

            if feed.shortname.is_empty() {
                errors.push(format!("feed '{}' has an empty shortname", feed.name));
            } else if !feed
                .shortname
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                || feed.shortname.starts_with('.')
            {
                errors.push(format!(
                    "feed shortname '{}' may only contain letters, digits, '-', '_' and '.'",
                    feed.shortname
                ));
            } else if !seen.insert(feed.shortname.as_str()) {
                errors.push(format!("duplicate feed shortname '{}'", feed.shortname));
            }

            if let Err(e) = Url::parse(&feed.url) {
                errors.push(format!("feed '{}' has invalid url '{}': {}", label, feed.url, e));
            }

            if let Some(pattern) = feed.regex.as_deref().filter(|p| !p.is_empty()) {
                if let Err(e) = Regex::new(pattern) {
                    errors.push(format!("feed '{}' has invalid regex: {}", label, e));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Look up a configured feed
    pub fn feed(&self, shortname: &str) -> ConfigResult<&FeedConfig> {
        self.feeds
            .iter()
            .find(|feed| feed.shortname == shortname)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "feed".to_string(),
                value: shortname.to_string(),
                reason: "no feed with this shortname is configured".to_string(),
            })
    }

    /// Feeds named by `filter`, or all feeds when it is empty
    pub fn select_feeds(&self, filter: &[String]) -> ConfigResult<Vec<&FeedConfig>> {
        if filter.is_empty() {
            return Ok(self.feeds.iter().collect());
        }
        filter.iter().map(|shortname| self.feed(shortname)).collect()
    }

    /// Database file path
    pub fn database_path(&self) -> PathBuf {
        self.settings
            .database
            .clone()
            .unwrap_or_else(|| data_dir().join(store::DATABASE_FILE_NAME))
    }

    /// Runtime settings before CLI overrides
    pub fn run_settings(&self) -> RunSettings {
        let settings = &self.settings;
        RunSettings {
            media_root: settings
                .media_root
                .clone()
                .unwrap_or_else(|| data_dir().join(store::MEDIA_DIR_NAME)),
            max_dup_checks: settings.max_dup_checks,
            force_update: settings.force_update,
            use_most_recent_xml: settings.use_most_recent_xml,
            download_after: settings.download_after,
            mark_downloaded: settings.mark_downloaded,
            simulate: settings.simulate,
            do_archive: settings.do_archive,
            do_rename: settings.do_rename,
            do_collision: settings.do_collision,
            save_collision: settings.save_collision,
            xml_files_retained: settings.xml_files_retained,
            cleaner: FilenameCleaner::new(
                settings.filename_replacement,
                settings.max_filename_length,
            ),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(store::APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(store::APP_DIR_NAME))
}
