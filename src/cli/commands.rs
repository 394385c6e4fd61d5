//! Command handlers for Castkeeper CLI
//!
//! This module implements the command handlers that turn CLI arguments and
//! the loaded configuration into a run context and drive the library passes.
//! Summaries are printed here; the library only logs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::app::context::{Feed, RunContext, RunSettings};
use crate::app::integrity::{check_feed, CollisionPrompt, SkipCollisions};
use crate::app::repository::{RepositoryFactory, SqliteFactory};
use crate::app::{archive_feed, export_feed, preview_feed, update_feed, FeedClient, UpdateStatus};
use crate::cli::args::{
    ArchiveArgs, CheckArgs, DeleteArgs, ExportArgs, PreviewArgs, UpdateArgs,
};
use crate::cli::prompt::LinePrompt;
use crate::config::AppConfig;
use crate::errors::{AppError, ItemFailure, Result};

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["◐", "◓", "◑", "◒"]),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn build_context(config: &AppConfig, settings: RunSettings) -> Result<RunContext> {
    let client = FeedClient::with_config(config.client.to_runtime_config())?;
    let repositories = SqliteFactory::new(config.database_path());
    info!("Using database {}", repositories.path().display());
    Ok(RunContext::new(
        settings,
        Arc::new(repositories),
        Arc::new(client),
    ))
}

fn resolve_feeds(config: &AppConfig, settings: &RunSettings, filter: &[String]) -> Result<Vec<Feed>> {
    config
        .select_feeds(filter)?
        .into_iter()
        .map(|feed| feed.resolve(settings))
        .collect()
}

fn print_failures(failures: &[ItemFailure]) {
    for failure in failures {
        println!("    ✗ {}", failure);
    }
}

fn feeds_failed(failed: usize) -> Result<()> {
    if failed == 0 {
        Ok(())
    } else {
        Err(AppError::generic(format!("{} feed(s) failed", failed)))
    }
}

/// Handle the update command
pub async fn handle_update(config: &AppConfig, args: UpdateArgs) -> Result<()> {
    let start_time = Instant::now();
    config.validate()?;

    let mut settings = config.run_settings();
    args.apply(&mut settings);
    let feeds = resolve_feeds(config, &settings, &args.feeds)?;
    let ctx = build_context(config, settings)?;

    let mut failed = 0;
    for feed in &feeds {
        let progress = spinner(format!("Updating {}...", feed.name));
        let result = update_feed(&ctx, feed).await;
        progress.finish_and_clear();

        match result {
            Ok(report) => {
                let status = match report.status {
                    UpdateStatus::Updated => "updated",
                    UpdateStatus::Unchanged => "unchanged",
                    UpdateStatus::Simulated => "simulated",
                };
                println!(
                    "{} ({}): {} new, {} modified, {} downloaded ({} bytes), {} images",
                    feed.shortname,
                    status,
                    report.counts.new,
                    report.counts.modified,
                    report.downloads.downloaded,
                    report.downloads.bytes,
                    report.images
                );
                print_failures(&report.failures);
            }
            Err(e) => {
                error!("Update of {} failed: {}", feed.shortname, e);
                println!("{}: failed: {}", feed.shortname, e);
                failed += 1;
            }
        }
    }

    info!("Update finished in {:.1}s", start_time.elapsed().as_secs_f64());
    feeds_failed(failed)
}

/// Handle the check command
pub async fn handle_check(config: &AppConfig, args: CheckArgs) -> Result<()> {
    config.validate()?;

    let mut settings = config.run_settings();
    args.apply(&mut settings);
    let interactive = settings.do_collision;
    let feeds = resolve_feeds(config, &settings, &args.feeds)?;
    let ctx = build_context(config, settings)?;

    let mut stdin_prompt;
    let mut skip = SkipCollisions;
    let prompt: &mut dyn CollisionPrompt = if interactive {
        stdin_prompt = LinePrompt::stdio();
        &mut stdin_prompt
    } else {
        &mut skip
    };

    let mut failed = 0;
    for feed in &feeds {
        match check_feed(&ctx, feed, prompt) {
            Ok(report) => {
                let verdict = if report.is_clean() { "clean" } else { "anomalies" };
                println!(
                    "{} ({}): {} items, {} hash mismatches, {} shared guids, {} shared filenames, \
                     {} missing, {} untracked, {} drifted, {} renamed, {} deleted",
                    feed.shortname,
                    verdict,
                    report.items_checked,
                    report.hash_mismatches,
                    report.guid_collisions,
                    report.filename_collisions,
                    report.missing_files,
                    report.untracked_files,
                    report.drifted,
                    report.renamed,
                    report.deleted
                );
                for dump in &report.collision_dumps {
                    println!("    collision dump: {}", dump.display());
                }
                print_failures(&report.failures);
            }
            Err(e) => {
                println!("{}: failed: {}", feed.shortname, e);
                failed += 1;
            }
        }
    }
    feeds_failed(failed)
}

/// Handle the archive command
pub async fn handle_archive(config: &AppConfig, args: ArchiveArgs) -> Result<()> {
    config.validate()?;

    let mut settings = config.run_settings();
    args.apply(&mut settings);
    let feeds = resolve_feeds(config, &settings, &args.feeds)?;
    let ctx = build_context(config, settings)?;

    let mut failed = 0;
    for feed in &feeds {
        match archive_feed(&ctx, feed) {
            Ok(report) => {
                println!("{}: {} items archived", feed.shortname, report.items_moved());
                for year in &report.years {
                    println!(
                        "    {}: {} items, {} images{}",
                        year.year,
                        year.items_moved,
                        year.images_moved,
                        year.snapshot
                            .as_ref()
                            .map(|path| format!(", snapshot {}", path.display()))
                            .unwrap_or_default()
                    );
                }
                print_failures(&report.failures);
            }
            Err(e) => {
                println!("{}: failed: {}", feed.shortname, e);
                failed += 1;
            }
        }
    }
    feeds_failed(failed)
}

/// Handle the preview command
pub async fn handle_preview(config: &AppConfig, args: PreviewArgs) -> Result<()> {
    let mut settings = config.run_settings();
    settings.use_most_recent_xml |= args.use_recent_xml;
    let feed = config.feed(&args.shortname)?.resolve(&settings)?;
    let ctx = build_context(config, settings)?;

    let progress = spinner(format!("Fetching {}...", feed.name));
    let result = preview_feed(&ctx, &feed, args.limit).await;
    progress.finish_and_clear();
    let preview = result?;

    println!("{} ({} items)", preview.channel_title, preview.entries.len());
    for entry in &preview.entries {
        let date = entry
            .pub_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        println!("  #{:<4} {}  {}", entry.count, date, entry.filename);
        println!("         {}", entry.title);
    }
    print_failures(&preview.failures);
    Ok(())
}

/// Handle the export command
pub async fn handle_export(config: &AppConfig, args: ExportArgs) -> Result<()> {
    let repo = SqliteFactory::new(config.database_path()).open()?;
    let export = export_feed(repo.as_ref(), &args.shortname)?;
    match &args.output {
        Some(path) => {
            export.write_to(path)?;
            println!("Exported {} items to {}", export.items.len(), path.display());
        }
        None => println!("{}", export.to_json()?),
    }
    Ok(())
}

/// Handle the delete command
pub async fn handle_delete(config: &AppConfig, args: DeleteArgs) -> Result<()> {
    if !args.yes {
        let question = format!(
            "Delete all stored history for '{}'? Media files are kept.",
            args.shortname
        );
        if !LinePrompt::stdio().confirm(&question)? {
            println!("Aborted");
            return Ok(());
        }
    }

    let mut repo = SqliteFactory::new(config.database_path()).open()?;
    if repo.delete_feed(&args.shortname)? {
        println!("Deleted {}", args.shortname);
    } else {
        println!("No stored state for {}", args.shortname);
    }
    Ok(())
}

/// Handle the feeds command
pub async fn handle_feeds(config: &AppConfig) -> Result<()> {
    let repo = SqliteFactory::new(config.database_path()).open()?;
    let stored: HashMap<String, i64> = repo
        .list_feeds()?
        .into_iter()
        .map(|record| (record.shortname, record.episode_count))
        .collect();

    if config.feeds.is_empty() {
        println!("No feeds configured");
    }
    for feed in &config.feeds {
        let count = stored
            .get(&feed.shortname)
            .map(|count| format!("{} episodes seen", count))
            .unwrap_or_else(|| "never updated".to_string());
        println!("{:<20} {:<40} {}", feed.shortname, feed.name, count);
    }
    Ok(())
}
