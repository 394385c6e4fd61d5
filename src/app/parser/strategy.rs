//! Parse strategies
//!
//! The parser asks its strategy before doing work that may be wasted: whether
//! the channel dates show the feed has advanced, how to identify an item, and
//! whether an item needs to be parsed at all.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::app::hash::{identity_hash, ItemHash};
use crate::errors::ParseResult;

/// What to do with an item whose identity is already known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemDecision {
    /// Parse and return the item
    Parse,
    /// Drop this item and continue with the next
    Skip,
    /// Drop this item and every item after it
    CancelRemaining,
}

/// Hooks consulted by [`parse_feed`](super::parse_feed)
pub trait ParseStrategy {
    /// Return true to abandon parsing given the channel `pubDate`
    fn cancel_on_pub_date(&mut self, date: &DateTime<Utc>) -> bool;

    /// Return true to abandon parsing given the channel `lastBuildDate`
    fn cancel_on_build_date(&mut self, date: &DateTime<Utc>) -> bool;

    /// Normalize the enclosure URL and compute the identity hash
    fn item_hash(&self, guid: &str, url: &str) -> ParseResult<(ItemHash, String)>;

    /// Decide whether an identified item should be parsed
    fn skip_item(&mut self, hash: &ItemHash) -> ItemDecision;
}

/// Strategy used by the update pipeline
///
/// Cancels when the channel dates have not moved past what was stored on the
/// previous run and skips items whose hash is already known. On newest-first
/// feeds a run of `max_dup_checks` consecutive known items means everything
/// further down is old, so the remaining items are dropped unparsed.
#[derive(Debug)]
pub struct UpdateStrategy {
    url_rule: Option<String>,
    last_pub_date: Option<DateTime<Utc>>,
    last_build_date: Option<DateTime<Utc>>,
    known: HashSet<ItemHash>,
    force: bool,
    newest_first: bool,
    max_dup_checks: usize,
    consecutive_known: usize,
}

impl UpdateStrategy {
    pub fn new(
        url_rule: Option<String>,
        last_pub_date: Option<DateTime<Utc>>,
        last_build_date: Option<DateTime<Utc>>,
        known: HashSet<ItemHash>,
    ) -> Self {
        Self {
            url_rule,
            last_pub_date,
            last_build_date,
            known,
            force: false,
            newest_first: true,
            max_dup_checks: 0,
            consecutive_known: 0,
        }
    }

    /// Parse everything regardless of dates or known hashes
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Enable the duplicate-run cutoff; 0 disables it
    pub fn with_duplicate_cutoff(mut self, newest_first: bool, max_dup_checks: usize) -> Self {
        self.newest_first = newest_first;
        self.max_dup_checks = max_dup_checks;
        self
    }

    fn not_newer(stored: Option<DateTime<Utc>>, date: &DateTime<Utc>) -> bool {
        stored.map_or(false, |stored| *date <= stored)
    }
}

impl ParseStrategy for UpdateStrategy {
    fn cancel_on_pub_date(&mut self, date: &DateTime<Utc>) -> bool {
        !self.force && Self::not_newer(self.last_pub_date, date)
    }

    fn cancel_on_build_date(&mut self, date: &DateTime<Utc>) -> bool {
        !self.force && Self::not_newer(self.last_build_date, date)
    }

    fn item_hash(&self, guid: &str, url: &str) -> ParseResult<(ItemHash, String)> {
        identity_hash(guid, url, self.url_rule.as_deref())
    }

    fn skip_item(&mut self, hash: &ItemHash) -> ItemDecision {
        if self.force || !self.known.contains(hash) {
            self.consecutive_known = 0;
            return ItemDecision::Parse;
        }

        self.consecutive_known += 1;
        if self.newest_first
            && self.max_dup_checks > 0
            && self.consecutive_known >= self.max_dup_checks
        {
            debug!(
                "{} consecutive known items, skipping the rest of the feed",
                self.consecutive_known
            );
            return ItemDecision::CancelRemaining;
        }
        ItemDecision::Skip
    }
}

/// Strategy used for previews: never cancels, optionally stops after `limit`
/// items
#[derive(Debug, Default)]
pub struct PreviewStrategy {
    url_rule: Option<String>,
    limit: Option<usize>,
    parsed: usize,
}

impl PreviewStrategy {
    pub fn new(url_rule: Option<String>, limit: Option<usize>) -> Self {
        Self {
            url_rule,
            limit,
            parsed: 0,
        }
    }
}

impl ParseStrategy for PreviewStrategy {
    fn cancel_on_pub_date(&mut self, _date: &DateTime<Utc>) -> bool {
        false
    }

    fn cancel_on_build_date(&mut self, _date: &DateTime<Utc>) -> bool {
        false
    }

    fn item_hash(&self, guid: &str, url: &str) -> ParseResult<(ItemHash, String)> {
        identity_hash(guid, url, self.url_rule.as_deref())
    }

    fn skip_item(&mut self, _hash: &ItemHash) -> ItemDecision {
        if self.limit.map_or(false, |limit| self.parsed >= limit) {
            return ItemDecision::CancelRemaining;
        }
        self.parsed += 1;
        ItemDecision::Parse
    }
}
