//! Raw feed document cache
//!
//! Every fetched document is kept as `<shortname>_<timestamp>.xml` in the
//! feed's XML directory. Only the newest `retained` captures survive a store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::app::client::write_atomically;
use crate::constants::files;
use crate::errors::DownloadResult;

/// Rotating store of fetched feed documents
#[derive(Debug, Clone)]
pub struct XmlCache {
    directory: PathBuf,
    shortname: String,
    retained: usize,
}

impl XmlCache {
    pub fn new(directory: impl Into<PathBuf>, shortname: impl Into<String>, retained: usize) -> Self {
        Self {
            directory: directory.into(),
            shortname: shortname.into(),
            retained: retained.max(1),
        }
    }

    /// Cache file name for a capture taken at `at`
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}_{}.{}",
            self.shortname,
            at.format(files::XML_TIMESTAMP_FORMAT),
            files::XML_EXTENSION
        )
    }

    /// Store a document and rotate old captures
    pub fn store(&self, document: &str, at: DateTime<Utc>) -> DownloadResult<PathBuf> {
        let path = self.directory.join(self.file_name(at));
        write_atomically(&path, document.as_bytes())?;
        debug!("Cached feed document at {}", path.display());

        if let Err(e) = self.rotate() {
            warn!(
                "Failed to rotate cached documents in {}: {}",
                self.directory.display(),
                e
            );
        }
        Ok(path)
    }

    /// Cached captures for this feed, oldest first
    pub fn cached_files(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut captures: Vec<(NaiveDateTime, PathBuf)> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if let Some(taken) = self.capture_time(&path) {
                captures.push((taken, path));
            }
        }
        captures.sort();
        Ok(captures.into_iter().map(|(_, path)| path).collect())
    }

    /// Newest cached capture, if any
    pub fn most_recent(&self) -> io::Result<Option<PathBuf>> {
        Ok(self.cached_files()?.pop())
    }

    /// Contents of the newest cached capture, if any
    pub fn read_most_recent(&self) -> io::Result<Option<String>> {
        match self.most_recent()? {
            Some(path) => {
                debug!("Using cached feed document {}", path.display());
                fs::read_to_string(path).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Remove the oldest captures beyond the retained count
    pub fn rotate(&self) -> io::Result<Vec<PathBuf>> {
        let files = self.cached_files()?;
        let excess = files.len().saturating_sub(self.retained);
        let removed: Vec<PathBuf> = files.into_iter().take(excess).collect();
        for path in &removed {
            fs::remove_file(path)?;
            debug!("Removed old feed document {}", path.display());
        }
        Ok(removed)
    }

    fn capture_time(&self, path: &Path) -> Option<NaiveDateTime> {
        if path.extension()? != files::XML_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let stamp = stem
            .strip_prefix(self.shortname.as_str())?
            .strip_prefix('_')?;
        NaiveDateTime::parse_from_str(stamp, files::XML_TIMESTAMP_FORMAT).ok()
    }
}
