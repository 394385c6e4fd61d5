//! Three-tier collision resolver
//!
//! Incoming items are matched against persisted state by identity hash, then
//! by guid. A hash match is a duplicate whose metadata is refreshed; a guid
//! match with a different hash is the same episode moved to new media; no
//! match is a new episode that gets the next sequence number and a fresh
//! filename probed against every name already in use.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::app::context::Feed;
use crate::app::hash::ItemHash;
use crate::app::models::{FeedRecord, Item};
use crate::app::parser::ParsedItem;
use crate::errors::{FilenameError, ItemFailure};

/// Persisted items with hash, guid and filename lookups
///
/// Items keep their load order; the lookups hold positions into it.
#[derive(Debug, Default)]
pub struct ItemIndex {
    items: Vec<Item>,
    by_hash: HashMap<ItemHash, usize>,
    by_guid: HashMap<String, usize>,
    by_filename: HashMap<String, usize>,
}

impl ItemIndex {
    /// Build the lookups; duplicates mean earlier corruption and are logged,
    /// the first occurrence wins
    pub fn build(items: Vec<Item>) -> Self {
        let mut index = Self::default();
        for item in items {
            index.push(item);
        }
        index
    }

    fn push(&mut self, item: Item) -> usize {
        let position = self.items.len();
        if let Some(&first) = self.by_hash.get(&item.hash) {
            warn!(
                "Duplicate hash {} for '{}' (already used by '{}')",
                item.hash,
                item.label(),
                self.items[first].label()
            );
        } else {
            self.by_hash.insert(item.hash, position);
        }
        if let Some(&first) = self.by_guid.get(&item.guid) {
            warn!(
                "Duplicate guid '{}' for '{}' (already used by '{}')",
                item.guid,
                item.label(),
                self.items[first].label()
            );
        } else {
            self.by_guid.insert(item.guid.clone(), position);
        }
        self.by_filename
            .entry(item.filename.clone())
            .or_insert(position);
        self.items.push(item);
        position
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, position: usize) -> &Item {
        &self.items[position]
    }

    pub fn get_mut(&mut self, position: usize) -> &mut Item {
        &mut self.items[position]
    }

    pub fn position_by_hash(&self, hash: &ItemHash) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    pub fn position_by_guid(&self, guid: &str) -> Option<usize> {
        self.by_guid.get(guid).copied()
    }

    pub fn filename_in_use(&self, filename: &str) -> bool {
        self.by_filename.contains_key(filename)
    }

    /// Hashes of every persisted item
    pub fn known_hashes(&self) -> HashSet<ItemHash> {
        self.by_hash.keys().copied().collect()
    }

    fn rekey_hash(&mut self, position: usize, hash: ItemHash) {
        let old = self.items[position].hash;
        if self.by_hash.get(&old) == Some(&position) {
            self.by_hash.remove(&old);
        }
        self.items[position].hash = hash;
        self.by_hash.insert(hash, position);
    }

    fn rekey_filename(&mut self, position: usize, filename: String) {
        let old = std::mem::replace(&mut self.items[position].filename, filename.clone());
        if self.by_filename.get(&old) == Some(&position) {
            self.by_filename.remove(&old);
        }
        self.by_filename.insert(filename, position);
    }

    pub fn into_items(self) -> Vec<Item> {
        self.items
    }
}

/// How an incoming item was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Same hash as a stored item
    Duplicate,
    /// Same guid, different hash
    Modified,
    New,
}

/// Tally of resolutions for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveCounts {
    pub new: usize,
    pub modified: usize,
    pub duplicate: usize,
}

/// Outcome of resolving one parsed batch
#[derive(Debug)]
pub struct ResolvedBatch {
    pub index: ItemIndex,
    /// Positions of items created or changed
    pub changed: BTreeSet<usize>,
    /// Positions queued for download, in processing order
    pub queued: Vec<usize>,
    pub counts: ResolveCounts,
}

/// Classifies incoming items against an [`ItemIndex`]
pub struct Resolver<'a> {
    feed: &'a Feed,
    force: bool,
    index: ItemIndex,
    changed: BTreeSet<usize>,
    queued: Vec<usize>,
    counts: ResolveCounts,
}

impl<'a> Resolver<'a> {
    pub fn new(feed: &'a Feed, index: ItemIndex, force: bool) -> Self {
        Self {
            feed,
            force,
            index,
            changed: BTreeSet::new(),
            queued: Vec::new(),
            counts: ResolveCounts::default(),
        }
    }

    /// Resolve one incoming item
    ///
    /// # Errors
    ///
    /// Returns an `ItemFailure` when a new item's filename collision
    /// suffixes are exhausted; the item is not created
    pub fn resolve(
        &mut self,
        record: &mut FeedRecord,
        incoming: ParsedItem,
    ) -> Result<Resolution, ItemFailure> {
        if let Some(position) = self.index.position_by_hash(&incoming.hash) {
            self.refresh_duplicate(position, incoming);
            self.counts.duplicate += 1;
            return Ok(Resolution::Duplicate);
        }

        let guid = incoming.xml.identity_guid().unwrap_or_default().to_string();
        if let Some(position) = self.index.position_by_guid(&guid) {
            self.apply_modification(position, incoming);
            self.counts.modified += 1;
            return Ok(Resolution::Modified);
        }

        self.create(record, guid, incoming)?;
        self.counts.new += 1;
        Ok(Resolution::New)
    }

    pub fn finish(self) -> ResolvedBatch {
        ResolvedBatch {
            index: self.index,
            changed: self.changed,
            queued: self.queued,
            counts: self.counts,
        }
    }

    fn queue(&mut self, position: usize) {
        if !self.queued.contains(&position) {
            self.queued.push(position);
        }
    }

    fn refresh_duplicate(&mut self, position: usize, incoming: ParsedItem) {
        let item = self.index.get_mut(position);
        if !self.force {
            warn!(
                "'{}' matched a stored item by hash; it should have been skipped while parsing",
                item.label()
            );
        }
        item.pub_date = incoming.xml.pub_time.or(item.pub_date);
        item.xml = incoming.xml;
        let queue = !item.downloaded;

        self.changed.insert(position);
        if queue {
            self.queue(position);
        }
    }

    fn apply_modification(&mut self, position: usize, incoming: ParsedItem) {
        let was_downloaded = {
            let item = self.index.get_mut(position);
            debug!(
                "'{}' moved from {} to {}",
                item.label(),
                item.url,
                incoming.normalized_url
            );
            item.url = incoming.normalized_url;
            item.pub_date = incoming.xml.pub_time.or(item.pub_date);
            item.xml = incoming.xml;
            std::mem::replace(&mut item.downloaded, false)
        };
        self.index.rekey_hash(position, incoming.hash);

        // A name already on disk is never changed here
        if !was_downloaded {
            self.regenerate_filename(position);
        }

        self.changed.insert(position);
        self.queue(position);
    }

    fn regenerate_filename(&mut self, position: usize) {
        let item = self.index.get(position);
        let rendered = self.feed.template.render_with_suffix(
            &item.xml,
            item.episode_count,
            item.filename_suffix,
        );
        match rendered {
            Ok(filename) if filename == item.filename => {}
            Ok(filename) => {
                if self.index.filename_in_use(&filename) {
                    warn!(
                        "Regenerated name {} for '{}' is taken, keeping {}",
                        filename,
                        item.label(),
                        item.filename
                    );
                } else {
                    self.index.rekey_filename(position, filename);
                }
            }
            Err(e) => warn!(
                "Cannot regenerate filename for '{}', keeping {}: {}",
                item.label(),
                item.filename,
                e
            ),
        }
    }

    fn create(
        &mut self,
        record: &mut FeedRecord,
        guid: String,
        incoming: ParsedItem,
    ) -> Result<(), ItemFailure> {
        let count = record.next_count();
        let index = &self.index;
        let probe = |name: &str| index.filename_in_use(name);
        let rendered = self
            .feed
            .template
            .render(&incoming.xml, count, Some(&probe));

        let (filename, filename_suffix) = match rendered {
            Ok(rendered) => (rendered.filename, rendered.suffix),
            Err(e @ FilenameError::SuffixExhausted { .. }) => {
                // The sequence number is not consumed by a failed item
                record.episode_count -= 1;
                return Err(ItemFailure::new(incoming.xml.title.clone(), e));
            }
            Err(e) => {
                let placeholder = self.feed.template.placeholder(&incoming.xml, &incoming.hash);
                warn!(
                    "Filename for '{}' failed ({}), using {}",
                    incoming.xml.title, e, placeholder
                );
                (placeholder, None)
            }
        };

        let item = Item {
            id: None,
            hash: incoming.hash,
            guid,
            url: incoming.normalized_url,
            filename,
            filename_suffix,
            episode_count: count,
            downloaded: false,
            archived: false,
            cd_filename: None,
            pub_date: incoming.xml.pub_time,
            xml: incoming.xml,
        };
        debug!("New item '{}' as {}", item.label(), item.filename);

        let position = self.index.push(item);
        self.changed.insert(position);
        self.queue(position);
        Ok(())
    }
}
