//! Per-run context
//!
//! Everything a pass needs is carried explicitly: merged settings, a way to
//! open the repository, network access, and the run timestamp. A context is
//! built once per invocation and passed by reference.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::app::client::Fetch;
use crate::app::filename::{FilenameCleaner, FilenameTemplate};
use crate::app::repository::{Repository, RepositoryFactory};
use crate::constants::{files, update};
use crate::errors::StoreResult;

/// Settings for one run: configuration merged with command-line flags
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub media_root: PathBuf,
    /// Consecutive known items before the rest of a feed is skipped; 0 disables
    pub max_dup_checks: usize,
    pub force_update: bool,
    pub use_most_recent_xml: bool,
    pub download_after: Option<NaiveDate>,
    /// Treat an existing file at the target path as already downloaded
    pub mark_downloaded: bool,
    /// Report what would happen without touching disk or store
    pub simulate: bool,
    pub do_archive: bool,
    pub do_rename: bool,
    pub do_collision: bool,
    pub save_collision: bool,
    pub xml_files_retained: usize,
    pub cleaner: FilenameCleaner,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("."),
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
            cleaner: FilenameCleaner::default(),
        }
    }
}

/// A configured feed with its paths resolved and template compiled
#[derive(Debug, Clone)]
pub struct Feed {
    pub name: String,
    pub shortname: String,
    pub url: String,
    pub url_rule: Option<String>,
    /// Feed lists oldest items first
    pub standard_chronological: bool,
    pub template: FilenameTemplate,
    pub directory: PathBuf,
    pub xml_directory: PathBuf,
    pub archive_directory: PathBuf,
}

impl Feed {
    /// Path of a media file in the active directory
    pub fn media_path(&self, filename: &str) -> PathBuf {
        self.directory.join(filename)
    }

    /// Active image directory
    pub fn image_directory(&self) -> PathBuf {
        self.directory.join(files::IMAGE_DIR)
    }

    /// Archive bucket directory for a year
    pub fn year_directory(&self, year: i32) -> PathBuf {
        self.archive_directory.join(year.to_string())
    }
}

/// Explicit per-run context
#[derive(Clone)]
pub struct RunContext {
    pub settings: RunSettings,
    repositories: Arc<dyn RepositoryFactory>,
    fetcher: Arc<dyn Fetch>,
    now: DateTime<Utc>,
}

impl RunContext {
    pub fn new(
        settings: RunSettings,
        repositories: Arc<dyn RepositoryFactory>,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            settings,
            repositories,
            fetcher,
            now: Utc::now(),
        }
    }

    /// Pin the run timestamp
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Open a repository handle for one logical operation
    pub fn open_repository(&self) -> StoreResult<Box<dyn Repository>> {
        self.repositories.open()
    }

    pub fn fetcher(&self) -> &dyn Fetch {
        self.fetcher.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn current_year(&self) -> i32 {
        self.now.year()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("settings", &self.settings)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}
