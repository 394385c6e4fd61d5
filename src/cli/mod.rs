//! Command-line interface components
//!
//! This module contains CLI-specific code for Castkeeper, including argument
//! parsing, command handlers, and terminal prompts.

pub mod args;
pub mod commands;
pub mod prompt;

pub use args::{
    ArchiveArgs, CheckArgs, Cli, Commands, DeleteArgs, ExportArgs, GlobalArgs, PreviewArgs,
    UpdateArgs,
};
pub use commands::{
    handle_archive, handle_check, handle_delete, handle_export, handle_feeds, handle_preview,
    handle_update,
};
pub use prompt::LinePrompt;
