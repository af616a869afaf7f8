//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// quill content pipeline CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Content directory path (relative to project root)
    #[arg(short, long)]
    pub content: Option<PathBuf>,

    /// Assets directory path (relative to project root)
    #[arg(short, long)]
    pub assets: Option<PathBuf>,

    /// Config file name (default: quill.toml)
    #[arg(short = 'C', long, default_value = "quill.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared build arguments for Build and Watch commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Clean output directory completely before building
    #[arg(long)]
    pub clean: bool,

    /// Minify the html content
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub minify: Option<bool>,

    /// enable rss feed generation
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub feed: Option<bool>,

    /// enable sitemap generation
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub sitemap: Option<bool>,

    /// Override base URL for the site.
    ///
    /// Useful for CI deployments where the production URL differs from the
    /// one in quill.toml.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site once
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Build, then rebuild incrementally on every change
    Watch {
        #[command(flatten)]
        build_args: BuildArgs,
    },
}

impl Cli {
    pub const fn build_args(&self) -> &BuildArgs {
        match &self.command {
            Commands::Build { build_args } | Commands::Watch { build_args } => build_args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_with_overrides() {
        let cli = Cli::parse_from([
            "quill", "-r", "site", "-o", "dist", "build", "--clean", "--minify=false",
        ]);
        assert_eq!(cli.root, Some(PathBuf::from("site")));
        assert_eq!(cli.output, Some(PathBuf::from("dist")));
        assert_eq!(cli.config, PathBuf::from("quill.toml"));
        assert!(cli.build_args().clean);
        assert_eq!(cli.build_args().minify, Some(false));
        assert!(matches!(cli.command, Commands::Build { .. }));
    }

    #[test]
    fn test_parse_watch_flag_without_value() {
        let cli = Cli::parse_from(["quill", "watch", "--feed"]);
        assert!(matches!(cli.command, Commands::Watch { .. }));
        assert_eq!(cli.build_args().feed, Some(true));
        assert_eq!(cli.build_args().sitemap, None);
    }
}
