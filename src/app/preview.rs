//! Dry-run of parsing and filename generation
//!
//! Fetches and parses a feed the way an update would, numbering and naming
//! items as new episodes after whatever is already stored, but writes
//! nothing: no cache file, no repository change, no download.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::app::context::{Feed, RunContext};
use crate::app::parser::{parse_feed, PreviewStrategy};
use crate::app::xml_cache::XmlCache;
use crate::errors::{FilenameError, ItemFailure, Result};

/// One previewed item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub title: String,
    pub pub_date: Option<DateTime<Utc>>,
    pub count: i64,
    pub filename: String,
    pub url: String,
}

/// Preview of a feed, oldest item first
#[derive(Debug, Default)]
pub struct Preview {
    pub channel_title: String,
    pub entries: Vec<PreviewEntry>,
    pub failures: Vec<ItemFailure>,
}

/// Preview a feed without persisting anything
///
/// `limit` bounds the number of items taken from the top of the document.
pub async fn preview_feed(ctx: &RunContext, feed: &Feed, limit: Option<usize>) -> Result<Preview> {
    let repo = ctx.open_repository()?;
    let (mut count, mut in_use) = match repo.load_feed(&feed.shortname)? {
        Some(record) => {
            let names: HashSet<String> = match record.id {
                Some(id) => repo
                    .load_items(id)?
                    .into_iter()
                    .map(|item| item.filename)
                    .collect(),
                None => HashSet::new(),
            };
            (record.episode_count, names)
        }
        None => (0, HashSet::new()),
    };
    drop(repo);

    let document = read_document(ctx, feed).await?;
    let mut strategy = PreviewStrategy::new(feed.url_rule.clone(), limit);
    let parsed = parse_feed(&document, &mut strategy)?;

    let mut preview = Preview {
        channel_title: parsed.channel.title,
        ..Default::default()
    };
    for rejected in parsed.rejected {
        preview
            .failures
            .push(ItemFailure::new(rejected.title, rejected.error));
    }

    let mut items = parsed.items;
    items.reverse();
    if feed.standard_chronological {
        items.reverse();
    }

    for item in items {
        count += 1;
        let probe = |name: &str| in_use.contains(name);
        let filename = match feed.template.render(&item.xml, count, Some(&probe)) {
            Ok(rendered) => rendered.filename,
            Err(e @ FilenameError::SuffixExhausted { .. }) => {
                count -= 1;
                preview.failures.push(ItemFailure::new(item.xml.title.clone(), e));
                continue;
            }
            Err(e) => {
                warn!("Filename for '{}' failed: {}", item.xml.title, e);
                feed.template.placeholder(&item.xml, &item.hash)
            }
        };
        debug!("Preview {} -> {}", item.xml.title, filename);
        in_use.insert(filename.clone());

        preview.entries.push(PreviewEntry {
            title: item.xml.title,
            pub_date: item.xml.pub_time,
            count,
            filename,
            url: item.normalized_url,
        });
    }

    Ok(preview)
}

async fn read_document(ctx: &RunContext, feed: &Feed) -> Result<String> {
    if ctx.settings.use_most_recent_xml {
        let cache = XmlCache::new(
            &feed.xml_directory,
            &feed.shortname,
            ctx.settings.xml_files_retained,
        );
        if let Some(document) = cache.read_most_recent()? {
            return Ok(document);
        }
    }
    Ok(ctx.fetcher().fetch_text(&feed.url).await?)
}
