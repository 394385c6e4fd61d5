//! Feed update orchestration
//!
//! One feed moves through load, parse, resolve, persist and download in
//! that order. Feed metadata and every changed item are saved before the
//! first download starts, and once more after the downloads finish
//! regardless of individual failures. A parse cancelled by the date checks
//! ends the update early as an unchanged feed.
//!
//! ```text
//! load ──► parse ──► resolve ──► persist ──► download ──► persist
//!            │
//!            └── cancelled: unchanged
//! ```

pub mod downloads;
pub mod resolver;

use std::collections::BTreeSet;

use tracing::{debug, error, info, warn};

use crate::app::context::{Feed, RunContext};
use crate::app::models::{FeedRecord, ImageRecord};
use crate::app::parser::{parse_feed, parse_feed_date, UpdateStrategy};
use crate::app::repository::{load_or_create_feed, Repository};
use crate::app::xml_cache::XmlCache;
use crate::errors::{ItemFailure, Result, StoreError, StoreResult};

pub use downloads::{excluded_by_date, image_file_name, DownloadTally};
pub use resolver::{ItemIndex, Resolution, ResolveCounts, ResolvedBatch, Resolver};

/// How an update ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Updated,
    /// Feed dates show nothing new since the last run
    Unchanged,
    /// Simulate mode: nothing was written
    Simulated,
}

/// Summary of one feed update
#[derive(Debug)]
pub struct UpdateReport {
    pub shortname: String,
    pub status: UpdateStatus,
    pub counts: ResolveCounts,
    /// Items skipped by the parser as already known
    pub skipped: usize,
    pub downloads: DownloadTally,
    pub images: usize,
    pub failures: Vec<ItemFailure>,
}

impl UpdateReport {
    fn new(shortname: &str, status: UpdateStatus) -> Self {
        Self {
            shortname: shortname.to_string(),
            status,
            counts: ResolveCounts::default(),
            skipped: 0,
            downloads: DownloadTally::default(),
            images: 0,
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// State loaded from the repository before parsing
struct LoadedFeed {
    record: FeedRecord,
    index: ItemIndex,
    images: Vec<ImageRecord>,
}

fn load(ctx: &RunContext, feed: &Feed) -> StoreResult<LoadedFeed> {
    let repo = ctx.open_repository()?;
    let record = load_or_create_feed(repo.as_ref(), &feed.shortname)?;
    let (items, images) = match record.id {
        Some(id) => (repo.load_items(id)?, repo.load_images(id)?),
        None => (Vec::new(), Vec::new()),
    };
    debug!(
        "Loaded {} with {} items and {} images",
        feed.shortname,
        items.len(),
        images.len()
    );
    Ok(LoadedFeed {
        record,
        index: ItemIndex::build(items),
        images,
    })
}

/// Feed document from the cache or the network
async fn obtain_document(ctx: &RunContext, feed: &Feed) -> Result<String> {
    let cache = XmlCache::new(
        &feed.xml_directory,
        &feed.shortname,
        ctx.settings.xml_files_retained,
    );

    if ctx.settings.use_most_recent_xml {
        match cache.read_most_recent() {
            Ok(Some(document)) => return Ok(document),
            Ok(None) => debug!("No cached document for {}, downloading", feed.shortname),
            Err(e) => warn!(
                "Cannot read cached documents for {}, downloading: {}",
                feed.shortname, e
            ),
        }
    }

    info!("Fetching {} from {}", feed.shortname, feed.url);
    let document = ctx.fetcher().fetch_text(&feed.url).await?;
    if !ctx.settings.simulate {
        if let Err(e) = cache.store(&document, ctx.now()) {
            warn!("Failed to cache document for {}: {}", feed.shortname, e);
        }
    }
    Ok(document)
}

/// Save the feed record and the items at `positions`
fn persist(
    repo: &mut dyn Repository,
    record: &mut FeedRecord,
    index: &mut ItemIndex,
    positions: &BTreeSet<usize>,
    images: &mut [ImageRecord],
) -> StoreResult<()> {
    repo.save_feed(record)?;
    let feed_id = record.id.ok_or_else(|| StoreError::Corrupt {
        reason: format!("feed {} has no id after saving", record.shortname),
    })?;

    let mut changed: Vec<_> = positions.iter().map(|&p| index.get(p).clone()).collect();
    repo.save_items(feed_id, &mut changed)?;
    for (&position, saved) in positions.iter().zip(changed) {
        index.get_mut(position).id = saved.id;
    }

    repo.save_images(feed_id, images)?;
    Ok(())
}

/// Refresh channel metadata and the last-seen dates
fn refresh_channel(record: &mut FeedRecord, channel: crate::app::models::ChannelXml) {
    if let Some(date) = channel.pub_date.as_deref().and_then(parse_feed_date) {
        record.last_pub_date = Some(date);
    }
    if let Some(date) = channel.last_build_date.as_deref().and_then(parse_feed_date) {
        record.last_build_date = Some(date);
    }
    record.channel = Some(channel);
}

/// Update one feed
///
/// # Errors
///
/// Returns an error when the repository cannot be opened or written, or the
/// feed document cannot be obtained or parsed. Item-level problems are
/// collected on the report instead.
pub async fn update_feed(ctx: &RunContext, feed: &Feed) -> Result<UpdateReport> {
    let settings = &ctx.settings;
    let LoadedFeed {
        mut record,
        index,
        mut images,
    } = load(ctx, feed)?;

    let document = obtain_document(ctx, feed).await?;

    let mut strategy = UpdateStrategy::new(
        feed.url_rule.clone(),
        record.last_pub_date,
        record.last_build_date,
        index.known_hashes(),
    )
    .with_force(settings.force_update)
    .with_duplicate_cutoff(!feed.standard_chronological, settings.max_dup_checks);

    let parsed = match parse_feed(&document, &mut strategy) {
        Ok(parsed) => parsed,
        Err(e) if e.is_cancelled() => {
            info!("{} unchanged: {}", feed.shortname, e);
            return Ok(UpdateReport::new(&feed.shortname, UpdateStatus::Unchanged));
        }
        Err(e) => return Err(e.into()),
    };

    let status = if settings.simulate {
        UpdateStatus::Simulated
    } else {
        UpdateStatus::Updated
    };
    let mut report = UpdateReport::new(&feed.shortname, status);
    report.skipped = parsed.skipped;

    for rejected in parsed.rejected {
        error!("{}: rejected '{}': {}", feed.shortname, rejected.title, rejected.error);
        report
            .failures
            .push(ItemFailure::new(rejected.title, rejected.error));
    }

    refresh_channel(&mut record, parsed.channel);

    // Oldest first for sequence numbering
    let mut items = parsed.items;
    items.reverse();
    if feed.standard_chronological {
        items.reverse();
    }

    let mut resolver = Resolver::new(feed, index, settings.force_update);
    for incoming in items {
        if let Err(failure) = resolver.resolve(&mut record, incoming) {
            error!("{}: {}", feed.shortname, failure);
            report.failures.push(failure);
        }
    }
    let ResolvedBatch {
        mut index,
        changed,
        mut queued,
        counts,
    } = resolver.finish();

    // Stored items whose earlier download failed go along with this run
    for position in 0..index.len() {
        let item = index.get(position);
        if !item.downloaded && !item.archived && !queued.contains(&position) {
            queued.push(position);
        }
    }
    report.counts = counts;
    info!(
        "{}: {} new, {} modified, {} duplicate",
        feed.shortname, counts.new, counts.modified, counts.duplicate
    );

    if !settings.simulate {
        let mut repo = ctx.open_repository()?;
        persist(repo.as_mut(), &mut record, &mut index, &changed, &mut images)?;
    }

    let mut downloaded = BTreeSet::new();
    report.downloads = downloads::download_queued(
        ctx,
        feed,
        &mut index,
        &queued,
        &mut downloaded,
        &mut report.failures,
    )
    .await;

    let primary = record
        .channel
        .as_ref()
        .and_then(|channel| channel.primary_image_url())
        .map(str::to_string);
    let queued_items = queued.iter().map(|&p| index.get(p));
    report.images = downloads::sync_images(
        ctx,
        feed,
        primary.as_deref(),
        queued_items,
        &mut images,
        &mut report.failures,
    )
    .await;

    if !settings.simulate {
        let mut repo = ctx.open_repository()?;
        persist(repo.as_mut(), &mut record, &mut index, &downloaded, &mut images)?;
    }

    Ok(report)
}

/// Update feeds one after another
///
/// A failing feed does not stop the others.
pub async fn update_all(ctx: &RunContext, feeds: &[Feed]) -> Vec<(String, Result<UpdateReport>)> {
    let mut results = Vec::with_capacity(feeds.len());
    for feed in feeds {
        let result = update_feed(ctx, feed).await;
        if let Err(e) = &result {
            error!("Update of {} failed: {}", feed.shortname, e);
        }
        results.push((feed.shortname.clone(), result));
    }
    results
}
