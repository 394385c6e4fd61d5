//! SQLite-backed repository
//!
//! Raw channel and item metadata live in their own one-to-one tables as JSON
//! so the relational columns stay small and queryable.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::migrations;
use super::{Repository, RepositoryFactory};
use crate::app::hash::ItemHash;
use crate::app::models::{FeedRecord, ImageRecord, Item};
use crate::errors::{StoreError, StoreResult};

const FEED_COLUMNS: &str = "f.id, f.shortname, f.episode_count, f.last_pub_date, \
     f.last_build_date, x.channel FROM feeds f LEFT JOIN feed_xml x ON x.feed_id = f.id";

const ITEM_COLUMNS: &str = "i.id, i.hash, i.guid, i.url, i.filename, i.filename_suffix, \
     i.episode_count, i.downloaded, i.archived, i.cd_filename, i.pub_date, x.item \
     FROM items i LEFT JOIN item_xml x ON x.item_id = i.id";

/// Repository over a single SQLite database file
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate a database file
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(mut conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;
        Ok(Self { conn, path })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

struct FeedRow {
    id: i64,
    shortname: String,
    episode_count: i64,
    last_pub_date: Option<DateTime<Utc>>,
    last_build_date: Option<DateTime<Utc>>,
    channel: Option<String>,
}

impl FeedRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            shortname: row.get(1)?,
            episode_count: row.get(2)?,
            last_pub_date: row.get(3)?,
            last_build_date: row.get(4)?,
            channel: row.get(5)?,
        })
    }

    fn into_record(self) -> StoreResult<FeedRecord> {
        let channel = match self.channel {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(FeedRecord {
            id: Some(self.id),
            shortname: self.shortname,
            episode_count: self.episode_count,
            last_pub_date: self.last_pub_date,
            last_build_date: self.last_build_date,
            channel,
        })
    }
}

struct ItemRow {
    id: i64,
    hash: String,
    guid: String,
    url: String,
    filename: String,
    filename_suffix: Option<String>,
    episode_count: i64,
    downloaded: bool,
    archived: bool,
    cd_filename: Option<String>,
    pub_date: Option<DateTime<Utc>>,
    xml: Option<String>,
}

impl ItemRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            hash: row.get(1)?,
            guid: row.get(2)?,
            url: row.get(3)?,
            filename: row.get(4)?,
            filename_suffix: row.get(5)?,
            episode_count: row.get(6)?,
            downloaded: row.get(7)?,
            archived: row.get(8)?,
            cd_filename: row.get(9)?,
            pub_date: row.get(10)?,
            xml: row.get(11)?,
        })
    }

    fn into_item(self) -> StoreResult<Item> {
        let hash = ItemHash::from_base64(&self.hash).map_err(|e| StoreError::Corrupt {
            reason: format!("item {}: {}", self.id, e),
        })?;
        let xml = match self.xml {
            Some(json) => serde_json::from_str(&json)?,
            None => {
                return Err(StoreError::Corrupt {
                    reason: format!("item {} has no metadata record", self.id),
                })
            }
        };
        Ok(Item {
            id: Some(self.id),
            hash,
            guid: self.guid,
            url: self.url,
            filename: self.filename,
            filename_suffix: self.filename_suffix.and_then(|s| s.chars().next()),
            episode_count: self.episode_count,
            downloaded: self.downloaded,
            archived: self.archived,
            cd_filename: self.cd_filename,
            pub_date: self.pub_date,
            xml,
        })
    }
}

impl Repository for SqliteStore {
    fn load_feed(&self, shortname: &str) -> StoreResult<Option<FeedRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} WHERE f.shortname = ?1", FEED_COLUMNS),
                params![shortname],
                FeedRow::from_row,
            )
            .optional()?;
        row.map(FeedRow::into_record).transpose()
    }

    fn list_feeds(&self) -> StoreResult<Vec<FeedRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} ORDER BY f.shortname", FEED_COLUMNS))?;
        let rows = stmt
            .query_map([], FeedRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(FeedRow::into_record).collect()
    }

    fn save_feed(&mut self, feed: &mut FeedRecord) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO feeds (shortname, episode_count, last_pub_date, last_build_date)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(shortname) DO UPDATE SET
                episode_count = excluded.episode_count,
                last_pub_date = excluded.last_pub_date,
                last_build_date = excluded.last_build_date",
            params![
                feed.shortname,
                feed.episode_count,
                feed.last_pub_date,
                feed.last_build_date
            ],
        )?;
        let id: i64 = tx.query_row(
            "SELECT id FROM feeds WHERE shortname = ?1",
            params![feed.shortname],
            |row| row.get(0),
        )?;

        if let Some(channel) = &feed.channel {
            tx.execute(
                "INSERT INTO feed_xml (feed_id, channel) VALUES (?1, ?2)
                 ON CONFLICT(feed_id) DO UPDATE SET channel = excluded.channel",
                params![id, serde_json::to_string(channel)?],
            )?;
        }
        tx.commit()?;

        feed.id = Some(id);
        Ok(())
    }

    fn load_items(&self, feed_id: i64) -> StoreResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} WHERE i.feed_id = ?1 AND i.deleted_at IS NULL
             ORDER BY i.pub_date ASC, i.id ASC",
            ITEM_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![feed_id], ItemRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(ItemRow::into_item).collect()
    }

    fn save_items(&mut self, feed_id: i64, items: &mut [Item]) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO items (feed_id, hash, guid, url, filename, filename_suffix,
                    episode_count, downloaded, archived, cd_filename, pub_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            let mut update = tx.prepare_cached(
                "UPDATE items SET hash = ?2, guid = ?3, url = ?4, filename = ?5,
                    filename_suffix = ?6, episode_count = ?7, downloaded = ?8,
                    archived = ?9, cd_filename = ?10, pub_date = ?11
                 WHERE id = ?1",
            )?;
            let mut save_xml = tx.prepare_cached(
                "INSERT INTO item_xml (item_id, item) VALUES (?1, ?2)
                 ON CONFLICT(item_id) DO UPDATE SET item = excluded.item",
            )?;

            for item in items.iter_mut() {
                let hash = item.hash.to_base64();
                let suffix = item.filename_suffix.map(String::from);
                let id = match item.id {
                    Some(id) => {
                        update.execute(params![
                            id,
                            hash,
                            item.guid,
                            item.url,
                            item.filename,
                            suffix,
                            item.episode_count,
                            item.downloaded,
                            item.archived,
                            item.cd_filename,
                            item.pub_date
                        ])?;
                        id
                    }
                    None => {
                        insert.execute(params![
                            feed_id,
                            hash,
                            item.guid,
                            item.url,
                            item.filename,
                            suffix,
                            item.episode_count,
                            item.downloaded,
                            item.archived,
                            item.cd_filename,
                            item.pub_date
                        ])?;
                        tx.last_insert_rowid()
                    }
                };
                save_xml.execute(params![id, serde_json::to_string(&item.xml)?])?;
                item.id = Some(id);
            }
        }
        tx.commit()?;
        debug!("Saved {} items for feed {}", items.len(), feed_id);
        Ok(())
    }

    fn delete_items(&mut self, feed_id: i64, items: &[Item]) -> StoreResult<()> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE items SET deleted_at = ?1 WHERE id = ?2 AND feed_id = ?3",
            )?;
            // The item row stays as history; its document does not
            let mut drop_xml = tx.prepare_cached("DELETE FROM item_xml WHERE item_id = ?1")?;
            for id in items.iter().filter_map(|item| item.id) {
                if stmt.execute(params![now, id, feed_id])? > 0 {
                    drop_xml.execute(params![id])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_images(&self, feed_id: i64) -> StoreResult<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, filename, downloaded, archived FROM images
             WHERE feed_id = ?1 ORDER BY id",
        )?;
        let images = stmt
            .query_map(params![feed_id], |row| {
                Ok(ImageRecord {
                    id: Some(row.get(0)?),
                    url: row.get(1)?,
                    filename: row.get(2)?,
                    downloaded: row.get(3)?,
                    archived: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    fn save_images(&mut self, feed_id: i64, images: &mut [ImageRecord]) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO images (feed_id, url, filename, downloaded, archived)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(feed_id, url) DO UPDATE SET
                    filename = excluded.filename,
                    downloaded = excluded.downloaded,
                    archived = excluded.archived",
            )?;
            let mut lookup =
                tx.prepare_cached("SELECT id FROM images WHERE feed_id = ?1 AND url = ?2")?;
            for image in images.iter_mut() {
                upsert.execute(params![
                    feed_id,
                    image.url,
                    image.filename,
                    image.downloaded,
                    image.archived
                ])?;
                let id: i64 = lookup.query_row(params![feed_id, image.url], |row| row.get(0))?;
                image.id = Some(id);
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_feed(&mut self, shortname: &str) -> StoreResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM feeds WHERE shortname = ?1", params![shortname])?;
        Ok(removed > 0)
    }
}

/// Opens [`SqliteStore`] handles on one database file
#[derive(Debug, Clone)]
pub struct SqliteFactory {
    path: PathBuf,
}

impl SqliteFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RepositoryFactory for SqliteFactory {
    fn open(&self) -> StoreResult<Box<dyn Repository>> {
        Ok(Box::new(SqliteStore::open(&self.path)?))
    }
}
