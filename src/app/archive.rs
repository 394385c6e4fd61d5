//! Per-year archival
//!
//! Items published before the current year are grouped by year, their files
//! (and artwork used only by that year) moved into `<archive>/<year>`, and a
//! standalone SQLite snapshot of the year written next to them. Archived
//! flags reach the main store only when every move in the year succeeded,
//! so a failed year is retried in full on the next pass.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::app::context::{Feed, RunContext};
use crate::app::models::{FeedRecord, ImageRecord, Item};
use crate::app::repository::{Repository, SqliteStore};
use crate::constants::files;
use crate::errors::{ArchiveError, ArchiveResult, ItemFailure, Result, StoreResult};

/// What happened to one year bucket
#[derive(Debug, Clone, Default)]
pub struct YearReport {
    pub year: i32,
    pub items_moved: usize,
    pub images_moved: usize,
    /// Items in the bucket that were never downloaded
    pub items_left: usize,
    /// Snapshot written, if any
    pub snapshot: Option<PathBuf>,
}

/// Archive pass report
#[derive(Debug, Default)]
pub struct ArchiveReport {
    pub shortname: String,
    pub years: Vec<YearReport>,
    pub failures: Vec<ItemFailure>,
}

impl ArchiveReport {
    /// Items moved across all years
    pub fn items_moved(&self) -> usize {
        self.years.iter().map(|year| year.items_moved).sum()
    }

    /// Check if every year archived cleanly
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Snapshot path for a year, never overwriting an earlier snapshot
pub fn snapshot_path(year_directory: &Path, shortname: &str, year: i32) -> PathBuf {
    let first = year_directory.join(format!(".{}_{}.db", shortname, year));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| year_directory.join(format!(".{}_{}.{}.db", shortname, year, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Move a file, copying across filesystems when a rename is not possible
fn move_file(from: &Path, to: &Path) -> ArchiveResult<()> {
    let moved = fs::rename(from, to).or_else(|_| {
        fs::copy(from, to)?;
        fs::remove_file(from)
    });
    moved.map_err(|source: io::Error| ArchiveError::MoveFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Relocate `from` into `to` unless a previous interrupted pass already did
fn relocate(from: &Path, to: &Path) -> ArchiveResult<()> {
    if from.is_file() {
        return move_file(from, to);
    }
    if to.is_file() {
        debug!("{} already archived", to.display());
        return Ok(());
    }
    Err(ArchiveError::MissingFile {
        path: from.to_path_buf(),
    })
}

/// Group unarchived items from past years by year
fn buckets(items: &[Item], current_year: i32) -> BTreeMap<i32, Vec<usize>> {
    let mut buckets: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (position, item) in items.iter().enumerate() {
        match item.pub_year() {
            Some(year) if year < current_year && !item.archived => {
                buckets.entry(year).or_default().push(position);
            }
            _ => {}
        }
    }
    buckets
}

/// Years referencing each image URL; `None` stands for an undated item
fn image_references(items: &[Item]) -> HashMap<&str, HashSet<Option<i32>>> {
    let mut references: HashMap<&str, HashSet<Option<i32>>> = HashMap::new();
    for item in items {
        if let Some(url) = item.xml.image_url() {
            references.entry(url).or_default().insert(item.pub_year());
        }
    }
    references
}

fn write_snapshot(
    path: &Path,
    record: &FeedRecord,
    items: &[Item],
    images: &[ImageRecord],
) -> StoreResult<()> {
    let mut store = SqliteStore::open(path)?;
    let mut snapshot_feed = FeedRecord {
        id: None,
        ..record.clone()
    };
    store.save_feed(&mut snapshot_feed)?;
    let feed_id = snapshot_feed.id.unwrap_or_default();

    let mut snapshot_items: Vec<Item> = items
        .iter()
        .map(|item| Item {
            id: None,
            ..item.clone()
        })
        .collect();
    store.save_items(feed_id, &mut snapshot_items)?;

    let mut snapshot_images: Vec<ImageRecord> = images
        .iter()
        .map(|image| ImageRecord {
            id: None,
            ..image.clone()
        })
        .collect();
    store.save_images(feed_id, &mut snapshot_images)
}

/// Archive one feed
///
/// # Errors
///
/// Only repository failures on the main store abort the pass; move and
/// snapshot failures are recorded per year on the report.
pub fn archive_feed(ctx: &RunContext, feed: &Feed) -> Result<ArchiveReport> {
    let mut report = ArchiveReport {
        shortname: feed.shortname.clone(),
        ..Default::default()
    };

    let repo = ctx.open_repository()?;
    let Some(record) = repo.load_feed(&feed.shortname)? else {
        info!("{} has no stored state, nothing to archive", feed.shortname);
        return Ok(report);
    };
    let Some(feed_id) = record.id else {
        return Ok(report);
    };
    let items = repo.load_items(feed_id)?;
    let mut images = repo.load_images(feed_id)?;
    drop(repo);

    let primary = record
        .channel
        .as_ref()
        .and_then(|channel| channel.primary_image_url())
        .map(str::to_string);
    let references = image_references(&items);

    for (year, positions) in buckets(&items, ctx.current_year()) {
        let year_directory = feed.year_directory(year);
        let image_directory = year_directory.join(files::IMAGE_DIR);
        let mut year_report = YearReport {
            year,
            ..Default::default()
        };
        let mut year_failures = Vec::new();

        let bucket: Vec<&Item> = positions.iter().map(|&p| &items[p]).collect();
        let exclusive_images: Vec<usize> = images
            .iter()
            .enumerate()
            .filter(|(_, image)| !image.archived && image.downloaded)
            .filter(|(_, image)| primary.as_deref() != Some(image.url.as_str()))
            .filter(|(_, image)| {
                references
                    .get(image.url.as_str())
                    .is_some_and(|years| years.len() == 1 && years.contains(&Some(year)))
            })
            .map(|(position, _)| position)
            .collect();

        if ctx.settings.simulate {
            for item in bucket.iter().filter(|item| item.downloaded) {
                info!(
                    "[simulate] would move {} to {}",
                    item.filename,
                    year_directory.display()
                );
                year_report.items_moved += 1;
            }
            year_report.items_left = bucket.iter().filter(|item| !item.downloaded).count();
            year_report.images_moved = exclusive_images.len();
            report.years.push(year_report);
            continue;
        }

        // Only never-downloaded items left: nothing to move or snapshot
        if exclusive_images.is_empty() && bucket.iter().all(|item| !item.downloaded) {
            debug!("{} {}: nothing to archive", feed.shortname, year);
            year_report.items_left = bucket.len();
            report.years.push(year_report);
            continue;
        }

        if let Err(e) = fs::create_dir_all(&year_directory) {
            error!("Cannot create {}: {}", year_directory.display(), e);
            report.failures.push(ItemFailure::new(year.to_string(), e));
            continue;
        }

        let mut archived_items = Vec::new();
        for item in &bucket {
            if !item.downloaded {
                year_report.items_left += 1;
                continue;
            }
            let from = feed.media_path(&item.filename);
            let to = year_directory.join(&item.filename);
            match relocate(&from, &to) {
                Ok(()) => {
                    archived_items.push(Item {
                        archived: true,
                        ..(*item).clone()
                    });
                }
                Err(e) => {
                    error!("{}: {}", item.label(), e);
                    year_failures.push(ItemFailure::new(item.label(), e));
                }
            }
        }

        let mut archived_images = Vec::new();
        if !exclusive_images.is_empty() {
            if let Err(e) = fs::create_dir_all(&image_directory) {
                year_failures.push(ItemFailure::new(year.to_string(), e));
            }
        }
        for &position in &exclusive_images {
            let image = &images[position];
            let from = feed.image_directory().join(&image.filename);
            let to = image_directory.join(&image.filename);
            match relocate(&from, &to) {
                Ok(()) => archived_images.push(position),
                Err(e) => {
                    error!("{}: {}", image.url, e);
                    year_failures.push(ItemFailure::new(image.url.clone(), e));
                }
            }
        }

        if !year_failures.is_empty() {
            warn!(
                "{} {}: {} failures, archived flags not saved",
                feed.shortname,
                year,
                year_failures.len()
            );
            report.failures.extend(year_failures);
            report.years.push(year_report);
            continue;
        }

        for &position in &archived_images {
            images[position].archived = true;
        }
        let mut year_images: Vec<ImageRecord> = archived_images
            .iter()
            .map(|&position| images[position].clone())
            .collect();

        let mut repo = ctx.open_repository()?;
        repo.save_items(feed_id, &mut archived_items)?;
        repo.save_images(feed_id, &mut year_images)?;
        drop(repo);

        year_report.items_moved = archived_items.len();
        year_report.images_moved = year_images.len();

        let path = snapshot_path(&year_directory, &feed.shortname, year);
        match write_snapshot(&path, &record, &archived_items, &year_images) {
            Ok(()) => {
                info!("Wrote {} snapshot {}", year, path.display());
                year_report.snapshot = Some(path);
            }
            Err(e) => {
                let failure = ArchiveError::SnapshotFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                };
                error!("{}", failure);
                report.failures.push(ItemFailure::new(year.to_string(), failure));
            }
        }
        report.years.push(year_report);
    }

    Ok(report)
}

/// Archive feeds one after another
pub fn archive_all(ctx: &RunContext, feeds: &[Feed]) -> Vec<(String, Result<ArchiveReport>)> {
    feeds
        .iter()
        .map(|feed| {
            let result = archive_feed(ctx, feed);
            if let Err(e) = &result {
                error!("Archive of {} failed: {}", feed.shortname, e);
            }
            (feed.shortname.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use crate::app::hash::ItemHash;
    use crate::app::models::ItemXml;

    fn item(guid: &str, year: Option<i32>, archived: bool) -> Item {
        Item {
            id: None,
            hash: ItemHash::compute(guid, "u"),
            guid: guid.to_string(),
            url: "u".to_string(),
            filename: format!("{}.mp3", guid),
            filename_suffix: None,
            episode_count: 1,
            downloaded: true,
            archived,
            cd_filename: None,
            pub_date: year.map(|y| Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()),
            xml: ItemXml::default(),
        }
    }

    #[test]
    fn test_buckets_exclude_current_year_and_archived() {
        let items = vec![
            item("a", Some(2022), false),
            item("b", Some(2023), false),
            item("c", Some(2022), true),
            item("d", Some(2024), false),
            item("e", None, false),
            item("f", Some(2022), false),
        ];
        let buckets = buckets(&items, 2024);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[&2022], vec![0, 5]);
        assert_eq!(buckets[&2023], vec![1]);
    }

    #[test]
    fn test_snapshot_path_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let first = snapshot_path(temp_dir.path(), "foo", 2022);
        assert_eq!(first, temp_dir.path().join(".foo_2022.db"));

        fs::write(&first, b"").unwrap();
        let second = snapshot_path(temp_dir.path(), "foo", 2022);
        assert_eq!(second, temp_dir.path().join(".foo_2022.1.db"));
    }

    #[test]
    fn test_relocate_recovers_from_interrupted_move() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.mp3");
        let to = temp_dir.path().join("a-moved.mp3");

        fs::write(&from, b"x").unwrap();
        relocate(&from, &to).unwrap();
        assert!(!from.exists() && to.exists());

        relocate(&from, &to).unwrap();

        fs::remove_file(&to).unwrap();
        assert!(matches!(
            relocate(&from, &to),
            Err(ArchiveError::MissingFile { .. })
        ));
    }
}
