//! Site configuration management for `quill.toml`.
//!
//! # Sections
//!
//! | Section              | Purpose                                          |
//! |----------------------|--------------------------------------------------|
//! | `[base]`             | Site metadata (title, author, description, url)  |
//! | `[build]`            | Paths, minification, clean builds                |
//! | `[build.transform]`  | Ordered transform chain                          |
//! | `[build.<stage>]`    | Options of each built-in transform stage         |
//! | `[build.feed]` etc.  | Aggregate artifacts (feed, sitemap, manifest)    |
//! | `[watch]`            | Incremental rebuild timing                       |
//! | `[extra]`            | User-defined custom fields                       |
//!
//! # Example
//!
//! ```toml
//! [base]
//! title = "My Blog"
//! description = "A personal blog"
//! url = "https://example.com"
//!
//! [build]
//! content = "content/blog"
//! assets = "content/assets"
//!
//! [build.transform]
//! chain = ["markdown", "images", "highlight", "reading_time"]
//!
//! [build.images]
//! widths = [295, 590, 1180]
//! ```

mod base;
mod build;
pub mod defaults;
mod error;
mod watch;

pub use base::BaseConfig;
pub use build::{BuildConfig, HighlightConfig, ImageFormat};
pub use error::ConfigError;
pub use watch::WatchConfig;

use crate::cli::Cli;
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing quill.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Basic site information
    #[serde(default)]
    pub base: BaseConfig,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// User-defined extra fields
    #[serde(default)]
    pub extra: HashMap<String, toml::Value>,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Default configuration with every directory resolved against `root`.
    #[cfg(test)]
    pub fn for_root(root: &Path) -> Self {
        let mut config = Self::default();
        config.resolve_paths(root);
        config
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());

        Self::update_option(&mut self.build.content, cli.content.as_ref());
        Self::update_option(&mut self.build.assets, cli.assets.as_ref());
        Self::update_option(&mut self.build.output, cli.output.as_ref());

        let args = cli.build_args();
        self.build.clean |= args.clean;
        Self::update_option(&mut self.build.minify, args.minify.as_ref());
        Self::update_option(&mut self.build.feed.enable, args.feed.as_ref());
        Self::update_option(&mut self.build.sitemap.enable, args.sitemap.as_ref());
        if let Some(url) = &args.base_url {
            self.base.url = Some(url.clone());
        }

        self.config_path = Self::normalize_path(&root.join(&cli.config));
        self.resolve_paths(&root);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Make all paths absolute, relative to `root`.
    fn resolve_paths(&mut self, root: &Path) {
        let root = Self::normalize_path(root);

        self.build.content = Self::normalize_path(&root.join(&self.build.content));
        self.build.assets = Self::normalize_path(&root.join(&self.build.assets));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
        if let Some(icon) = self.build.manifest.icon.as_ref() {
            self.build.manifest.icon = Some(Self::normalize_path(&root.join(icon)));
        }

        self.build.root = Some(root);
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration before a build.
    ///
    /// Stage names are validated separately when the transform chain is
    /// resolved against the registry.
    pub fn validate(&self) -> Result<()> {
        let needs_url = self.build.feed.enable || self.build.sitemap.enable;
        match &self.base.url {
            None if needs_url => {
                bail!("[base.url] is required for feed and sitemap generation")
            }
            Some(url) if !url.starts_with("http") => bail!(ConfigError::Validation(
                "[base.url] must start with http:// or https://".into()
            )),
            _ => {}
        }

        if !self.build.content.is_dir() {
            bail!(ConfigError::Validation(format!(
                "[build.content] `{}` is not a directory",
                self.build.content.display()
            )));
        }

        if self.build.transform.chain.is_empty() {
            bail!(ConfigError::Validation(
                "[build.transform.chain] must have at least one stage".into()
            ));
        }

        let images = &self.build.images;
        if images.widths.is_empty() || images.widths.contains(&0) {
            bail!(ConfigError::Validation(
                "[build.images.widths] must be a non-empty list of positive widths".into()
            ));
        }
        if images.formats.is_empty() {
            bail!(ConfigError::Validation(
                "[build.images.formats] must have at least one format".into()
            ));
        }
        if !(1..=100).contains(&images.quality) {
            bail!(ConfigError::Validation(
                "[build.images.quality] must be between 1 and 100".into()
            ));
        }

        if self.build.reading_time.words_per_minute == 0 {
            bail!(ConfigError::Validation(
                "[build.reading_time.words_per_minute] must be positive".into()
            ));
        }

        if let Some(icon) = &self.build.manifest.icon
            && self.build.manifest.enable
            && !icon.is_file()
        {
            bail!(ConfigError::Validation(format!(
                "[build.manifest.icon] `{}` not found",
                icon.display()
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn valid_config(root: &Path) -> SiteConfig {
        fs::create_dir_all(root.join("content/blog")).unwrap();
        let mut config = SiteConfig::for_root(root);
        config.base.url = Some("https://example.com".into());
        config
    }

    #[test]
    fn test_from_str() {
        let config = SiteConfig::from_str(
            r#"
            [base]
            title = "My Blog"
            description = "A test blog"
            author = "Test Author"
        "#,
        )
        .unwrap();
        assert_eq!(config.base.title, "My Blog");
        assert_eq!(config.base.author, "Test Author");
    }

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(SiteConfig::from_str("[base\ntitle = \"x\"").is_err());
    }

    #[test]
    fn test_get_root_default() {
        let config = SiteConfig::default();
        assert_eq!(config.get_root(), Path::new("./"));
    }

    #[test]
    fn test_for_root_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = SiteConfig::for_root(dir.path());
        let root = dir.path().canonicalize().unwrap();

        assert_eq!(config.build.content, root.join("content/blog"));
        assert_eq!(config.build.assets, root.join("content/assets"));
        assert_eq!(config.build.output, root.join("public"));
        assert_eq!(config.get_root(), root.as_path());
    }

    #[test]
    fn test_update_with_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::parse_from([
            "quill", "-r", root, "-o", "dist", "build", "--minify=false", "--base-url",
            "https://ci.example.com",
        ]);

        let mut config = SiteConfig::default();
        config.update_with_cli(&cli);

        assert!(config.build.output.ends_with("dist"));
        assert!(!config.build.minify);
        assert_eq!(config.base.url.as_deref(), Some("https://ci.example.com"));
        assert!(config.config_path.ends_with("quill.toml"));
    }

    #[test]
    fn test_validate_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(valid_config(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_requires_url_for_feed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.base.url = None;
        assert!(config.validate().is_err());

        config.build.feed.enable = false;
        config.build.sitemap.enable = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.base.url = Some("example.com".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn test_validate_rejects_empty_widths_and_bad_quality() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config(dir.path());
        config.build.images.widths.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config(dir.path());
        config.build.images.quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_content_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SiteConfig::for_root(dir.path());
        config.base.url = Some("https://example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extra_fields() {
        let config: SiteConfig = toml::from_str(
            r#"
            [base]
            title = "Test"
            description = "Test blog"

            [extra]
            disqus = "htaidirt"
            page_progress_height = 3
        "#,
        )
        .unwrap();

        assert_eq!(
            config.extra.get("disqus").and_then(|v| v.as_str()),
            Some("htaidirt")
        );
        assert_eq!(
            config.extra.get("page_progress_height").and_then(|v| v.as_integer()),
            Some(3)
        );
    }

    #[test]
    fn test_full_config_all_sections() {
        let config: SiteConfig = toml::from_str(
            r##"
            [base]
            title = "My Blog"
            description = "A personal blog"
            author = "Alice"
            url = "https://myblog.com"

            [build]
            content = "posts"
            output = "dist"
            minify = false

            [build.transform]
            chain = ["markdown", "reading_time"]

            [build.images]
            widths = [400, 800]
            max_width = 800

            [build.highlight.prompt]
            user = "alice"
            global = true

            [build.feed]
            path = "feed.xml"

            [build.manifest]
            short_name = "alice"
            theme_color = "#000000"

            [watch]
            debounce_ms = 100
        "##,
        )
        .unwrap();

        assert_eq!(config.build.content, PathBuf::from("posts"));
        assert_eq!(config.build.transform.chain, vec!["markdown", "reading_time"]);
        assert_eq!(config.build.images.widths, vec![400, 800]);
        assert_eq!(config.build.highlight.prompt.user, "alice");
        assert_eq!(config.build.highlight.prompt.host, "localhost");
        assert!(config.build.highlight.prompt.global);
        assert_eq!(config.build.feed.path, PathBuf::from("feed.xml"));
        assert_eq!(config.build.manifest.short_name.as_deref(), Some("alice"));
        assert_eq!(config.watch.debounce_ms, 100);
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let result: Result<SiteConfig, _> = toml::from_str(
            r#"
            [base]
            title = "Test"
            description = "Test"

            [serve]
            port = 5277
        "#,
        );
        assert!(result.is_err());
    }
}
