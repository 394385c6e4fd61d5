//! Persistence boundary
//!
//! The pipeline only sees the narrow [`Repository`] interface. A
//! [`RepositoryFactory`] hands out a fresh handle around each logical
//! operation; nothing holds the store open across a whole run.
//!
//! Two implementations exist: [`SqliteStore`] for real use and archive
//! snapshots, and [`MemoryStore`] for tests.

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteFactory, SqliteStore};

use crate::app::models::{FeedRecord, ImageRecord, Item};
use crate::errors::StoreResult;

/// Feed, item and image persistence
///
/// Item ids are assigned by the store on first save and written back into
/// the passed records.
pub trait Repository: Send {
    /// Load a feed record by shortname
    fn load_feed(&self, shortname: &str) -> StoreResult<Option<FeedRecord>>;

    /// All persisted feed records
    fn list_feeds(&self) -> StoreResult<Vec<FeedRecord>>;

    /// Insert or update a feed record, assigning its id
    fn save_feed(&mut self, feed: &mut FeedRecord) -> StoreResult<()>;

    /// Live (not soft-deleted) items, ascending by publication time
    fn load_items(&self, feed_id: i64) -> StoreResult<Vec<Item>>;

    /// Upsert items and their raw metadata
    fn save_items(&mut self, feed_id: i64, items: &mut [Item]) -> StoreResult<()>;

    /// Soft-delete items; they disappear from `load_items`
    fn delete_items(&mut self, feed_id: i64, items: &[Item]) -> StoreResult<()>;

    fn load_images(&self, feed_id: i64) -> StoreResult<Vec<ImageRecord>>;

    /// Upsert images keyed by URL
    fn save_images(&mut self, feed_id: i64, images: &mut [ImageRecord]) -> StoreResult<()>;

    /// Permanently remove a feed with its whole item and image history;
    /// returns false when no such feed exists
    fn delete_feed(&mut self, shortname: &str) -> StoreResult<bool>;
}

/// Opens repository handles
pub trait RepositoryFactory: Send + Sync {
    fn open(&self) -> StoreResult<Box<dyn Repository>>;
}

/// Feed record for `shortname`, or a fresh unsaved one
pub fn load_or_create_feed(repo: &dyn Repository, shortname: &str) -> StoreResult<FeedRecord> {
    Ok(repo
        .load_feed(shortname)?
        .unwrap_or_else(|| FeedRecord::new(shortname)))
}
