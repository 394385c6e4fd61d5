//! Castkeeper CLI application
//!
//! Command-line interface for polling podcast feeds, downloading new episodes
//! and archiving past years.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use castkeeper::cli::{
    handle_archive, handle_check, handle_delete, handle_export, handle_feeds, handle_preview,
    handle_update, Cli, Commands,
};
use castkeeper::config::AppConfig;
use castkeeper::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error ({}): {}", e.category(), e);
        if e.is_recoverable() {
            eprintln!("This may succeed on a later run");
        }
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = AppConfig::load(cli.global.config.clone()).await?;

    init_logging(&cli, &config);
    info!("Castkeeper v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Update(args) => handle_update(&config, args).await,
        Commands::Check(args) => handle_check(&config, args).await,
        Commands::Archive(args) => handle_archive(&config, args).await,
        Commands::Preview(args) => handle_preview(&config, args).await,
        Commands::Export(args) => handle_export(&config, args).await,
        Commands::Delete(args) => handle_delete(&config, args).await,
        Commands::Feeds => handle_feeds(&config).await,
    }
}

/// Initialize logging from CLI verbosity, falling back to the config level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .unwrap_or_else(|| config.logging.level.clone());

    let filter = match format!("castkeeper={}", level).parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
