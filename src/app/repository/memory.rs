//! In-process repository
//!
//! Every handle opened from one [`MemoryStore`] shares the same state, so a
//! test can run a pass and then inspect what it persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::{Repository, RepositoryFactory};
use crate::app::models::{FeedRecord, ImageRecord, Item};
use crate::errors::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    feeds: Vec<FeedRecord>,
    /// (item, deleted) per feed id, in insertion order
    items: HashMap<i64, Vec<(Item, bool)>>,
    images: HashMap<i64, Vec<ImageRecord>>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared in-memory store; clones are handles on the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the data from the rest
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sort_key(item: &Item) -> (Option<DateTime<Utc>>, Option<i64>) {
    (item.pub_date, item.id)
}

impl Repository for MemoryStore {
    fn load_feed(&self, shortname: &str) -> StoreResult<Option<FeedRecord>> {
        Ok(self
            .state()
            .feeds
            .iter()
            .find(|feed| feed.shortname == shortname)
            .cloned())
    }

    fn list_feeds(&self) -> StoreResult<Vec<FeedRecord>> {
        let mut feeds = self.state().feeds.clone();
        feeds.sort_by(|a, b| a.shortname.cmp(&b.shortname));
        Ok(feeds)
    }

    fn save_feed(&mut self, feed: &mut FeedRecord) -> StoreResult<()> {
        let mut state = self.state();
        let existing = state
            .feeds
            .iter()
            .position(|stored| stored.shortname == feed.shortname);
        match existing {
            Some(index) => {
                feed.id = state.feeds[index].id;
                if feed.channel.is_none() {
                    feed.channel = state.feeds[index].channel.clone();
                }
                state.feeds[index] = feed.clone();
            }
            None => {
                feed.id = Some(state.allocate_id());
                state.feeds.push(feed.clone());
            }
        }
        Ok(())
    }

    fn load_items(&self, feed_id: i64) -> StoreResult<Vec<Item>> {
        let mut items: Vec<Item> = self
            .state()
            .items
            .get(&feed_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|(_, deleted)| !deleted)
                    .map(|(item, _)| item.clone())
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by_key(sort_key);
        Ok(items)
    }

    fn save_items(&mut self, feed_id: i64, items: &mut [Item]) -> StoreResult<()> {
        let mut state = self.state();
        for item in items.iter_mut() {
            let conflict = state.items.get(&feed_id).map_or(false, |stored| {
                stored
                    .iter()
                    .any(|(other, deleted)| !deleted && other.hash == item.hash && other.id != item.id)
            });
            if conflict {
                return Err(StoreError::Corrupt {
                    reason: format!("duplicate live hash {} in feed {}", item.hash, feed_id),
                });
            }

            if item.id.is_none() {
                item.id = Some(state.allocate_id());
            }
            let stored = state.items.entry(feed_id).or_default();
            match stored.iter_mut().find(|(other, _)| other.id == item.id) {
                Some((other, _)) => *other = item.clone(),
                None => stored.push((item.clone(), false)),
            }
        }
        Ok(())
    }

    fn delete_items(&mut self, feed_id: i64, items: &[Item]) -> StoreResult<()> {
        let mut state = self.state();
        if let Some(stored) = state.items.get_mut(&feed_id) {
            for (other, deleted) in stored.iter_mut() {
                if items.iter().any(|item| item.id.is_some() && item.id == other.id) {
                    *deleted = true;
                }
            }
        }
        Ok(())
    }

    fn load_images(&self, feed_id: i64) -> StoreResult<Vec<ImageRecord>> {
        Ok(self
            .state()
            .images
            .get(&feed_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_images(&mut self, feed_id: i64, images: &mut [ImageRecord]) -> StoreResult<()> {
        let mut state = self.state();
        for image in images.iter_mut() {
            let existing = state
                .images
                .get(&feed_id)
                .and_then(|stored| stored.iter().find(|other| other.url == image.url))
                .and_then(|other| other.id);
            let id = match existing {
                Some(id) => id,
                None => state.allocate_id(),
            };
            image.id = Some(id);

            let stored = state.images.entry(feed_id).or_default();
            match stored.iter_mut().find(|other| other.id == Some(id)) {
                Some(other) => *other = image.clone(),
                None => stored.push(image.clone()),
            }
        }
        Ok(())
    }

    fn delete_feed(&mut self, shortname: &str) -> StoreResult<bool> {
        let mut state = self.state();
        let Some(index) = state
            .feeds
            .iter()
            .position(|feed| feed.shortname == shortname)
        else {
            return Ok(false);
        };
        let feed = state.feeds.remove(index);
        if let Some(id) = feed.id {
            state.items.remove(&id);
            state.images.remove(&id);
        }
        Ok(true)
    }
}

impl RepositoryFactory for MemoryStore {
    fn open(&self) -> StoreResult<Box<dyn Repository>> {
        Ok(Box::new(self.clone()))
    }
}
