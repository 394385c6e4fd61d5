//! Enclosure and artwork downloads
//!
//! Runs after the resolved items have been persisted. Each queued item is
//! filtered by the run's date and presence policies and then fetched; a
//! failure is recorded against the item and the rest of the queue continues.

use std::collections::BTreeSet;

use sha1::{Digest, Sha1};
use tracing::{debug, error, info};
use url::Url;

use crate::app::context::{Feed, RunContext};
use crate::app::models::{ImageRecord, Item};
use crate::app::update::resolver::ItemIndex;
use crate::constants::files;
use crate::errors::ItemFailure;

/// Totals for one download step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadTally {
    pub downloaded: usize,
    /// Items excluded by the date filter or already present on disk
    pub skipped: usize,
    pub bytes: u64,
}

/// Whether the `download_after` filter excludes an item
///
/// Items without a publication date are never excluded.
pub fn excluded_by_date(item: &Item, ctx: &RunContext) -> bool {
    match (ctx.settings.download_after, item.pub_date) {
        (Some(after), Some(published)) => published.date_naive() < after,
        _ => false,
    }
}

/// URL to fetch for an item: the enclosure as published, else the stored URL
fn source_url(item: &Item) -> &str {
    item.xml.enclosure_url().unwrap_or(&item.url)
}

/// Download every queued item
///
/// Positions whose state changed are added to `changed`.
pub async fn download_queued(
    ctx: &RunContext,
    feed: &Feed,
    index: &mut ItemIndex,
    queued: &[usize],
    changed: &mut BTreeSet<usize>,
    failures: &mut Vec<ItemFailure>,
) -> DownloadTally {
    let settings = &ctx.settings;
    let mut tally = DownloadTally::default();

    for &position in queued {
        let item = index.get(position);
        if item.downloaded {
            continue;
        }

        if excluded_by_date(item, ctx) {
            debug!("'{}' predates the download cutoff", item.label());
            tally.skipped += 1;
            if !settings.simulate {
                let item = index.get_mut(position);
                item.downloaded = true;
                item.archived = true;
                changed.insert(position);
            }
            continue;
        }

        let destination = feed.media_path(&item.filename);
        if settings.mark_downloaded && destination.is_file() {
            debug!("{} already present, marking downloaded", destination.display());
            tally.skipped += 1;
            if !settings.simulate {
                index.get_mut(position).downloaded = true;
                changed.insert(position);
            }
            continue;
        }

        if settings.simulate {
            let length = item.xml.enclosure.as_ref().map_or(0, |e| e.length);
            info!(
                "[simulate] would download '{}' to {} ({} bytes)",
                item.label(),
                destination.display(),
                length
            );
            tally.downloaded += 1;
            tally.bytes += length;
            continue;
        }

        let url = source_url(item).to_string();
        let label = item.label();
        match ctx.fetcher().fetch_to_file(&url, &destination).await {
            Ok(outcome) => {
                let item = index.get_mut(position);
                item.downloaded = true;
                if outcome.cd_filename.is_some() {
                    item.cd_filename = outcome.cd_filename;
                }
                changed.insert(position);
                tally.downloaded += 1;
                tally.bytes += outcome.bytes;
            }
            Err(e) => {
                error!("Failed to download '{}' from {}: {}", label, url, e);
                failures.push(ItemFailure::new(label, e));
            }
        }
    }

    tally
}

/// On-disk name for an image: SHA-1 of its URL plus the URL's extension
pub fn image_file_name(url: &str) -> String {
    let digest = Sha1::digest(url.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
    format!("{}.{}", hex, image_extension(url))
}

fn image_extension(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| {
            let segment = url.path_segments()?.last()?.to_string();
            let (_, ext) = segment.rsplit_once('.')?;
            let valid = !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric());
            valid.then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| files::DEFAULT_IMAGE_EXTENSION.to_string())
}

/// Track and fetch artwork for the feed and the given items
///
/// New URLs are appended to `images`. Returns the number of images fetched
/// (or that would be fetched in simulate mode).
pub async fn sync_images<'a>(
    ctx: &RunContext,
    feed: &Feed,
    primary: Option<&str>,
    items: impl Iterator<Item = &'a Item>,
    images: &mut Vec<ImageRecord>,
    failures: &mut Vec<ItemFailure>,
) -> usize {
    let mut wanted: Vec<String> = primary.map(str::to_string).into_iter().collect();
    for item in items {
        if let Some(url) = item.xml.image_url() {
            if !wanted.iter().any(|known| known == url) {
                wanted.push(url.to_string());
            }
        }
    }

    for url in &wanted {
        if !images.iter().any(|image| &image.url == url) {
            images.push(ImageRecord::new(url.clone(), image_file_name(url)));
        }
    }

    let directory = feed.image_directory();
    let mut fetched = 0;
    for image in images.iter_mut() {
        if image.downloaded || image.archived || !wanted.contains(&image.url) {
            continue;
        }

        let destination = directory.join(&image.filename);
        if destination.is_file() {
            image.downloaded = true;
            continue;
        }

        if ctx.settings.simulate {
            info!("[simulate] would fetch image {}", image.url);
            fetched += 1;
            continue;
        }

        match ctx.fetcher().fetch_to_file(&image.url, &destination).await {
            Ok(_) => {
                image.downloaded = true;
                fetched += 1;
            }
            Err(e) => {
                error!("Failed to fetch image {}: {}", image.url, e);
                failures.push(ItemFailure::new(image.url.clone(), e));
            }
        }
    }

    fetched
}
