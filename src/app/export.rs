//! JSON export of a feed's persisted state

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::app::client::write_atomically;
use crate::app::models::{FeedRecord, ImageRecord, Item};
use crate::app::repository::Repository;
use crate::errors::{Result, StoreError};

/// Everything stored for one feed
#[derive(Debug, Serialize)]
pub struct FeedExport {
    pub feed: FeedRecord,
    pub items: Vec<Item>,
    pub images: Vec<ImageRecord>,
}

/// Collect a feed's record, items and images
pub fn export_feed(repo: &dyn Repository, shortname: &str) -> Result<FeedExport> {
    let feed = repo
        .load_feed(shortname)?
        .ok_or_else(|| StoreError::NotFound {
            what: format!("feed {}", shortname),
        })?;
    let (items, images) = match feed.id {
        Some(id) => (repo.load_items(id)?, repo.load_images(id)?),
        None => (Vec::new(), Vec::new()),
    };
    Ok(FeedExport {
        feed,
        items,
        images,
    })
}

impl FeedExport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(StoreError::from)?)
    }

    /// Write the export to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_atomically(path, self.to_json()?.as_bytes())?;
        info!("Exported {} to {}", self.feed.shortname, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::repository::MemoryStore;

    #[test]
    fn test_export_unknown_feed_is_not_found() {
        let store = MemoryStore::new();
        let result = export_feed(&store, "missing");
        assert!(matches!(
            result,
            Err(crate::errors::AppError::Store(StoreError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_export_json_shape() {
        let mut store = MemoryStore::new();
        let mut record = FeedRecord::new("foo");
        record.episode_count = 3;
        store.save_feed(&mut record).unwrap();

        let export = export_feed(&store, "foo").unwrap();
        let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        assert_eq!(value["feed"]["shortname"], "foo");
        assert_eq!(value["feed"]["episode_count"], 3);
        assert!(value["items"].as_array().unwrap().is_empty());
    }
}
