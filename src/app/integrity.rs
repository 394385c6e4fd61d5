//! Integrity checks over persisted items
//!
//! Five re-runnable passes:
//! - identity hashes recomputed from stored guid and enclosure URL
//! - guids shared by more than one item
//! - filenames shared by more than one item, resolved through a
//!   [`CollisionPrompt`] and/or dumped as JSON for manual review
//! - file presence compared against the downloaded and archived flags
//! - filenames regenerated from the current template and, when renaming is
//!   enabled, applied on disk
//!
//! Anomalies are logged; nothing is corrected unless a run flag asks for it.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::app::client::write_atomically;
use crate::app::context::{Feed, RunContext};
use crate::app::hash::identity_hash;
use crate::app::models::Item;
use crate::errors::{ItemFailure, Result};

/// Decision for a pair of items sharing a filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionDecision {
    KeepFirst,
    KeepSecond,
    Skip,
}

/// Source of collision decisions
pub trait CollisionPrompt {
    fn decide(&mut self, first: &Item, second: &Item) -> CollisionDecision;
}

/// Prompt that never deletes anything
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipCollisions;

impl CollisionPrompt for SkipCollisions {
    fn decide(&mut self, _first: &Item, _second: &Item) -> CollisionDecision {
        CollisionDecision::Skip
    }
}

/// Integrity pass report
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub shortname: String,
    pub items_checked: usize,
    pub hash_mismatches: usize,
    pub guid_collisions: usize,
    pub filename_collisions: usize,
    pub deleted: usize,
    pub collision_dumps: Vec<PathBuf>,
    /// Items marked downloaded whose file is gone
    pub missing_files: usize,
    /// Files present for items not marked downloaded
    pub untracked_files: usize,
    pub marked_archived: usize,
    /// Items whose stored filename differs from the current template
    pub drifted: usize,
    pub renamed: usize,
    pub failures: Vec<ItemFailure>,
}

impl IntegrityReport {
    /// Check if no anomaly was found
    pub fn is_clean(&self) -> bool {
        self.hash_mismatches == 0
            && self.guid_collisions == 0
            && self.filename_collisions == 0
            && self.missing_files == 0
            && self.untracked_files == 0
            && self.drifted == 0
            && self.failures.is_empty()
    }
}

#[derive(Serialize)]
struct CollisionDump<'a> {
    filename: &'a str,
    items: [&'a Item; 2],
}

/// Positions of items sharing a key, first occurrence first
fn shared_keys<'a, F>(items: &'a [Item], key: F) -> BTreeMap<&'a str, Vec<usize>>
where
    F: Fn(&'a Item) -> &'a str,
{
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (position, item) in items.iter().enumerate() {
        groups.entry(key(item)).or_default().push(position);
    }
    groups.retain(|_, positions| positions.len() > 1);
    groups
}

fn check_hashes(feed: &Feed, items: &[Item], report: &mut IntegrityReport) {
    for item in items {
        let source = item.xml.enclosure_url().unwrap_or(&item.url);
        match identity_hash(&item.guid, source, feed.url_rule.as_deref()) {
            Ok((hash, _)) if hash == item.hash => {}
            Ok((hash, _)) => {
                warn!(
                    "'{}': stored hash {} does not match recomputed {}",
                    item.label(),
                    item.hash,
                    hash
                );
                report.hash_mismatches += 1;
            }
            Err(e) => {
                warn!("'{}': cannot recompute hash: {}", item.label(), e);
                report.hash_mismatches += 1;
            }
        }
    }
}

fn check_guids(items: &[Item], report: &mut IntegrityReport) {
    for (guid, positions) in shared_keys(items, |item| item.guid.as_str()) {
        let labels: Vec<String> = positions.iter().map(|&p| items[p].label()).collect();
        warn!("Guid '{}' shared by {}", guid, labels.join(", "));
        report.guid_collisions += 1;
    }
}

/// Returns the positions chosen for deletion
fn check_filenames(
    ctx: &RunContext,
    feed: &Feed,
    items: &[Item],
    prompt: &mut dyn CollisionPrompt,
    report: &mut IntegrityReport,
) -> HashSet<usize> {
    let settings = &ctx.settings;
    let mut doomed = HashSet::new();

    for (filename, positions) in shared_keys(items, |item| item.filename.as_str()) {
        warn!("Filename {} shared by {} items", filename, positions.len());
        report.filename_collisions += 1;

        // Each later item is compared against the one currently kept
        let mut first = positions[0];
        for &second in &positions[1..] {
            if settings.save_collision && !settings.simulate {
                let dump = CollisionDump {
                    filename,
                    items: [&items[first], &items[second]],
                };
                let path = feed.xml_directory.join(format!("collision_{}.json", filename));
                let written = serde_json::to_vec_pretty(&dump)
                    .map_err(|e| ItemFailure::new(filename, crate::errors::StoreError::from(e)))
                    .and_then(|bytes| {
                        write_atomically(&path, &bytes).map_err(|e| ItemFailure::new(filename, e))
                    });
                match written {
                    Ok(()) => {
                        info!("Wrote collision dump {}", path.display());
                        if !report.collision_dumps.contains(&path) {
                            report.collision_dumps.push(path);
                        }
                    }
                    Err(failure) => {
                        error!("{}", failure);
                        report.failures.push(failure);
                    }
                }
            }

            if settings.do_collision {
                match prompt.decide(&items[first], &items[second]) {
                    CollisionDecision::KeepFirst => {
                        doomed.insert(second);
                    }
                    CollisionDecision::KeepSecond => {
                        doomed.insert(first);
                        first = second;
                    }
                    CollisionDecision::Skip => {}
                }
            }
        }
    }

    doomed
}

/// Returns whether the item changed
fn check_presence(ctx: &RunContext, feed: &Feed, item: &mut Item, report: &mut IntegrityReport) -> bool {
    let present = feed.media_path(&item.filename).is_file();
    match (item.downloaded, present) {
        (true, false) => {
            report.missing_files += 1;
            if ctx.settings.do_archive {
                info!("'{}': file missing, marking archived", item.label());
                item.archived = true;
                report.marked_archived += 1;
                return true;
            }
            warn!("'{}': marked downloaded but {} is missing", item.label(), item.filename);
        }
        (false, true) => {
            warn!(
                "'{}': {} exists but is not marked downloaded",
                item.label(),
                item.filename
            );
            report.untracked_files += 1;
        }
        _ => {}
    }
    false
}

/// Returns whether the item changed
fn check_filename(
    ctx: &RunContext,
    feed: &Feed,
    item: &mut Item,
    in_use: &mut HashSet<String>,
    report: &mut IntegrityReport,
) -> bool {
    let expected =
        match feed
            .template
            .render_with_suffix(&item.xml, item.episode_count, item.filename_suffix)
        {
            Ok(expected) => expected,
            Err(e) => {
                warn!("'{}': cannot regenerate filename: {}", item.label(), e);
                return false;
            }
        };
    if expected == item.filename {
        return false;
    }

    report.drifted += 1;
    if !ctx.settings.do_rename {
        warn!(
            "'{}': filename {} differs from template result {}",
            item.label(),
            item.filename,
            expected
        );
        return false;
    }
    if in_use.contains(&expected) {
        warn!(
            "'{}': not renaming {} to {}, name used by another item",
            item.label(),
            item.filename,
            expected
        );
        return false;
    }

    let from = feed.media_path(&item.filename);
    let to = feed.media_path(&expected);
    if ctx.settings.simulate {
        info!("[simulate] would rename {} to {}", item.filename, expected);
        return false;
    }
    if from.is_file() {
        if to.exists() {
            warn!("'{}': {} already exists on disk", item.label(), to.display());
            return false;
        }
        if let Err(e) = fs::rename(&from, &to) {
            error!("Rename {} -> {} failed: {}", from.display(), to.display(), e);
            report.failures.push(ItemFailure::new(item.label(), e));
            return false;
        }
    }

    debug!("Renamed {} to {}", item.filename, expected);
    in_use.remove(&item.filename);
    in_use.insert(expected.clone());
    item.filename = expected;
    report.renamed += 1;
    true
}

/// Run every pass over one feed
///
/// # Errors
///
/// Returns an error only when the repository cannot be opened, read or
/// written.
pub fn check_feed(
    ctx: &RunContext,
    feed: &Feed,
    prompt: &mut dyn CollisionPrompt,
) -> Result<IntegrityReport> {
    let mut report = IntegrityReport {
        shortname: feed.shortname.clone(),
        ..Default::default()
    };

    let repo = ctx.open_repository()?;
    let Some(feed_id) = repo.load_feed(&feed.shortname)?.and_then(|record| record.id) else {
        info!("{} has no stored state, nothing to check", feed.shortname);
        return Ok(report);
    };
    let items = repo.load_items(feed_id)?;
    drop(repo);
    report.items_checked = items.len();

    check_hashes(feed, &items, &mut report);
    check_guids(&items, &mut report);
    let doomed = check_filenames(ctx, feed, &items, prompt, &mut report);

    let (deleted, mut remaining): (Vec<_>, Vec<_>) = items
        .into_iter()
        .enumerate()
        .partition(|(position, _)| doomed.contains(position));
    let deleted: Vec<Item> = deleted.into_iter().map(|(_, item)| item).collect();

    let mut in_use: HashSet<String> = remaining.iter().map(|(_, i)| i.filename.clone()).collect();
    let mut changed = Vec::new();
    for (_, item) in remaining.iter_mut().filter(|(_, item)| !item.archived) {
        let presence_changed = check_presence(ctx, feed, item, &mut report);
        let name_changed = !item.archived && check_filename(ctx, feed, item, &mut in_use, &mut report);
        if presence_changed || name_changed {
            changed.push(item.clone());
        }
    }

    if ctx.settings.simulate {
        return Ok(report);
    }
    if !deleted.is_empty() || !changed.is_empty() {
        let mut repo = ctx.open_repository()?;
        if !deleted.is_empty() {
            for item in &deleted {
                info!("Deleting '{}' ({})", item.label(), item.filename);
            }
            repo.delete_items(feed_id, &deleted)?;
            report.deleted = deleted.len();
        }
        repo.save_items(feed_id, &mut changed)?;
    }

    Ok(report)
}

/// Check feeds one after another
pub fn check_all(
    ctx: &RunContext,
    feeds: &[Feed],
    prompt: &mut dyn CollisionPrompt,
) -> Vec<(String, Result<IntegrityReport>)> {
    feeds
        .iter()
        .map(|feed| {
            let result = check_feed(ctx, feed, prompt);
            if let Err(e) = &result {
                error!("Check of {} failed: {}", feed.shortname, e);
            }
            (feed.shortname.clone(), result)
        })
        .collect()
}
