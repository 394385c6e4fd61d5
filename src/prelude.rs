//! Prelude module for Castkeeper Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use castkeeper::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use castkeeper::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let ctx = RunContext::new(
//!         config.run_settings(),
//!         Arc::new(SqliteFactory::new(config.database_path())),
//!         Arc::new(FeedClient::new()?),
//!     );
//!
//!     for feed_config in config.select_feeds(&[])? {
//!         let feed = feed_config.resolve(&ctx.settings)?;
//!         let report = update_feed(&ctx, &feed).await?;
//!         println!("{}: {} new", report.shortname, report.counts.new);
//!     }
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, ItemFailure, Result};

// Configuration
pub use crate::config::{AppConfig, FeedConfig};

// Pipeline passes and their reports
pub use crate::app::{
    archive_feed, check_feed, export_feed, preview_feed, update_all, update_feed, ArchiveReport,
    CollisionDecision, CollisionPrompt, IntegrityReport, Preview, UpdateReport, UpdateStatus,
};

// Context, storage and network seams
pub use crate::app::{
    ClientConfig, Feed, FeedClient, Fetch, MemoryStore, Repository, RepositoryFactory, RunContext,
    RunSettings, SqliteFactory, SqliteStore,
};

// Data types
pub use crate::app::{FeedRecord, ImageRecord, Item, ItemHash, ItemXml};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        let _client_config = ClientConfig::default();
        let settings = RunSettings::default();
        let _ctx = RunContext::new(
            settings,
            Arc::new(MemoryStore::new()),
            Arc::new(FeedClient::new().unwrap()),
        );

        let hash = ItemHash::compute("guid", "https://example.com/a.mp3");
        assert_eq!(hash.to_base64().len(), 28);
    }

    #[test]
    fn test_std_reexports() {
        let _path = PathBuf::from("/tmp/test");
        let data = Arc::new(42);
        assert_eq!(*data, 42);
    }
}
