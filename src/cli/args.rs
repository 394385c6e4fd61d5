//! Command-line argument parsing for Castkeeper
//!
//! This module defines the CLI structure using clap derive macros. Run flags
//! given here are OR-ed into the `[settings]` loaded from the configuration
//! file; they can switch a behavior on but never off.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::context::RunSettings;

/// Castkeeper - keep a personal podcast archive
#[derive(Parser, Debug)]
#[command(
    name = "castkeeper",
    version,
    about = "Poll podcast feeds, download new episodes and archive past years",
    long_about = "Castkeeper tracks episodes across runs by a stable identity, gives every enclosure
a deterministic filename, downloads what is new and moves past years into per-year archives."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch feeds and download new episodes
    Update(UpdateArgs),

    /// Run integrity checks over stored items
    Check(CheckArgs),

    /// Move past years into per-year archives
    Archive(ArchiveArgs),

    /// Show how a feed would be parsed and named, without saving anything
    Preview(PreviewArgs),

    /// Dump a feed's stored state as JSON
    Export(ExportArgs),

    /// Remove a feed's stored record and item history
    Delete(DeleteArgs),

    /// List configured feeds
    Feeds,
}

/// Arguments for the update command
#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Only these feeds (repeatable; default: all)
    #[arg(long = "feed", value_name = "SHORTNAME")]
    pub feeds: Vec<String>,

    /// Ignore feed dates and known items
    #[arg(short, long)]
    pub force: bool,

    /// Report what would happen without writing anything
    #[arg(short = 'n', long)]
    pub simulate: bool,

    /// Parse the newest cached document instead of downloading
    #[arg(long)]
    pub use_recent_xml: bool,
}

/// Arguments for the check command
#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    /// Only these feeds (repeatable; default: all)
    #[arg(long = "feed", value_name = "SHORTNAME")]
    pub feeds: Vec<String>,

    /// Rename files whose name no longer matches the template
    #[arg(long)]
    pub rename: bool,

    /// Mark items whose file is missing as archived
    #[arg(long)]
    pub fix_archived: bool,

    /// Ask which item to keep when two share a filename
    #[arg(long)]
    pub resolve_collisions: bool,

    /// Write colliding items side by side as JSON
    #[arg(long)]
    pub save_collisions: bool,
}

/// Arguments for the archive command
#[derive(Args, Debug, Clone, Default)]
pub struct ArchiveArgs {
    /// Only these feeds (repeatable; default: all)
    #[arg(long = "feed", value_name = "SHORTNAME")]
    pub feeds: Vec<String>,

    /// Report what would move without touching anything
    #[arg(short = 'n', long)]
    pub simulate: bool,
}

/// Arguments for the preview command
#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    /// Feed to preview
    pub shortname: String,

    /// Only the first N items of the document
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Parse the newest cached document instead of downloading
    #[arg(long)]
    pub use_recent_xml: bool,
}

/// Arguments for the export command
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Feed to export
    pub shortname: String,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Arguments for the delete command
#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Feed to delete
    pub shortname: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level requested by flags, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }
}

impl UpdateArgs {
    pub fn apply(&self, settings: &mut RunSettings) {
        settings.force_update |= self.force;
        settings.simulate |= self.simulate;
        settings.use_most_recent_xml |= self.use_recent_xml;
    }
}

impl CheckArgs {
    pub fn apply(&self, settings: &mut RunSettings) {
        settings.do_rename |= self.rename;
        settings.do_archive |= self.fix_archived;
        settings.do_collision |= self.resolve_collisions;
        settings.save_collision |= self.save_collisions;
    }
}

impl ArchiveArgs {
    pub fn apply(&self, settings: &mut RunSettings) {
        settings.simulate |= self.simulate;
    }
}
