//! Core application logic for Castkeeper
//!
//! This module contains the feed ingestion pipeline: identity hashing, the
//! RSS parser, filename templating, persistence, the HTTP client, and the
//! update, archive and integrity passes built on top of them.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use castkeeper::app::context::{RunContext, RunSettings};
//! use castkeeper::app::repository::SqliteFactory;
//! use castkeeper::app::{update_all, FeedClient};
//! use castkeeper::config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None).await?;
//! let settings = config.run_settings();
//! let feeds = config.select_feeds(&[])?;
//! let feeds = feeds
//!     .iter()
//!     .map(|feed| feed.resolve(&settings))
//!     .collect::<Result<Vec<_>, _>>()?;
//!
//! let ctx = RunContext::new(
//!     settings,
//!     Arc::new(SqliteFactory::new(config.database_path())),
//!     Arc::new(FeedClient::new()?),
//! );
//! for (shortname, result) in update_all(&ctx, &feeds).await {
//!     println!("{}: {:?}", shortname, result.map(|report| report.status));
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod client;
pub mod context;
pub mod export;
pub mod filename;
pub mod hash;
pub mod integrity;
pub mod models;
pub mod parser;
pub mod preview;
pub mod repository;
pub mod update;
pub mod xml_cache;

// Re-export main public API
pub use archive::{archive_all, archive_feed, ArchiveReport, YearReport};
pub use client::{ClientConfig, FeedClient, Fetch};
pub use context::{Feed, RunContext, RunSettings};
pub use export::{export_feed, FeedExport};
pub use filename::{FilenameCleaner, FilenameTemplate};
pub use hash::{identity_hash, normalize_url, ItemHash};
pub use integrity::{
    check_all, check_feed, CollisionDecision, CollisionPrompt, IntegrityReport, SkipCollisions,
};
pub use models::{ChannelXml, FeedRecord, ImageRecord, Item, ItemXml};
pub use preview::{preview_feed, Preview, PreviewEntry};
pub use repository::{MemoryStore, Repository, RepositoryFactory, SqliteFactory, SqliteStore};
pub use update::{update_all, update_feed, UpdateReport, UpdateStatus};
pub use xml_cache::XmlCache;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(RunSettings::default().max_dup_checks, 3);
    }
}
