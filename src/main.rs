//! quill - a content pipeline for markdown blogs.

mod build;
mod cli;
mod config;
mod content;
mod context;
mod emit;
mod graph;
mod imaging;
mod logger;
mod transform;
mod utils;
mod watch;

use anyhow::{Result, bail};
use build::Site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Build { .. } => build_once(config),
        Commands::Watch { .. } => watch::watch(config, &cli),
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    if !config_path.exists() {
        bail!("Config file not found: {}", config_path.display());
    }

    let mut config = SiteConfig::from_path(&config_path)?;
    config.update_with_cli(cli);
    config.validate()?;
    Ok(config)
}

/// Single pass. Per-file errors are reported; duplicate slugs and write
/// failures fail the command.
fn build_once(config: SiteConfig) -> Result<()> {
    let mut site = Site::new(Arc::new(config))?;
    let report = site.build()?;
    report.log();
    if report.error_count() > 0 {
        log!("warn"; "{} files excluded because of errors", report.error_count());
    }
    Ok(())
}
