//! `[build]` section configuration.
//!
//! Contains build settings: source/output paths, the transform chain and the
//! options of each built-in stage, plus the aggregate artifacts.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Enums
// ============================================================================

/// Encoding of a derived raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl ImageFormat {
    /// File extension of the encoded variant.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// MIME type used in `<source type=..>` and the manifest.
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }
}

// ============================================================================
// Main BuildConfig
// ============================================================================

/// `[build]` section in quill.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// content = "content/blog"
/// assets = "content/assets"
/// output = "public"
///
/// [build.transform]
/// chain = ["markdown", "images", "highlight", "reading_time"]
///
/// [build.images]
/// widths = [295, 590, 1180]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Content source directory (markdown + co-located files).
    #[serde(default = "defaults::build::content")]
    #[educe(Default = defaults::build::content())]
    pub content: PathBuf,

    /// Static assets directory (site icon, shared images).
    #[serde(default = "defaults::build::assets")]
    #[educe(Default = defaults::build::assets())]
    pub assets: PathBuf,

    /// Build output directory.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Minify HTML and XML output.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub minify: bool,

    /// Remove the output directory before building.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub clean: bool,

    #[serde(default)]
    pub transform: TransformConfig,

    #[serde(default)]
    pub markdown: MarkdownConfig,

    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(default)]
    pub iframes: IframesConfig,

    #[serde(default)]
    pub highlight: HighlightConfig,

    #[serde(default)]
    pub reading_time: ReadingTimeConfig,

    #[serde(default)]
    pub excerpt: ExcerptConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub sitemap: SitemapConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,
}

// ============================================================================
// Transform stages
// ============================================================================

/// `[build.transform]` section - the ordered stage names run for every node.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    #[serde(default = "defaults::build::transform::chain")]
    #[educe(Default = defaults::build::transform::chain())]
    pub chain: Vec<String>,
}

/// `[build.markdown]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct MarkdownConfig {
    /// Curly quotes, en/em dashes and ellipses.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub smart_punctuation: bool,

    /// Emit `id` attributes on headings.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub heading_ids: bool,

    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub footnotes: bool,
}

/// `[build.images]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ImagesConfig {
    /// Target widths of the derived variants, in pixels.
    #[serde(default = "defaults::build::images::widths")]
    #[educe(Default = defaults::build::images::widths())]
    pub widths: Vec<u32>,

    /// Encodings by preference; the last one is the `<img>` fallback.
    #[serde(default = "defaults::build::images::formats")]
    #[educe(Default = defaults::build::images::formats())]
    pub formats: Vec<ImageFormat>,

    /// Rendered width of the content column.
    #[serde(default = "defaults::build::images::max_width")]
    #[educe(Default = defaults::build::images::max_width())]
    pub max_width: u32,

    /// Wrap images in `<figure>` with a caption from title/alt.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub show_captions: bool,

    /// Lossy encoder quality (1-100).
    #[serde(default = "defaults::build::images::quality")]
    #[educe(Default = defaults::build::images::quality())]
    pub quality: u8,
}

/// `[build.iframes]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct IframesConfig {
    /// Extra inline style on the responsive wrapper.
    #[serde(default = "defaults::build::iframes::wrapper_style")]
    #[educe(Default = defaults::build::iframes::wrapper_style())]
    pub wrapper_style: String,
}

/// `[build.highlight]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct HighlightConfig {
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub line_numbers: bool,

    #[serde(default)]
    pub prompt: PromptConfig,

    /// Languages rendered with a command-line prompt.
    #[serde(default = "defaults::build::highlight::command_line_languages")]
    #[educe(Default = defaults::build::highlight::command_line_languages())]
    pub command_line_languages: Vec<String>,
}

/// `[build.highlight.prompt]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PromptConfig {
    #[serde(default = "defaults::build::highlight::user")]
    #[educe(Default = defaults::build::highlight::user())]
    pub user: String,

    #[serde(default = "defaults::build::highlight::host")]
    #[educe(Default = defaults::build::highlight::host())]
    pub host: String,

    /// Apply the prompt to every code block, not only shell languages.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub global: bool,
}

/// `[build.reading_time]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ReadingTimeConfig {
    #[serde(default = "defaults::build::reading_time::words_per_minute")]
    #[educe(Default = defaults::build::reading_time::words_per_minute())]
    pub words_per_minute: u32,
}

/// `[build.excerpt]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ExcerptConfig {
    /// Maximum excerpt length in characters.
    #[serde(default = "defaults::build::excerpt::length")]
    #[educe(Default = defaults::build::excerpt::length())]
    pub length: usize,
}

// ============================================================================
// Aggregate artifacts
// ============================================================================

/// `[build.feed]` section - RSS feed generation.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    /// Output path, relative to the output directory.
    #[serde(default = "defaults::build::feed::path")]
    #[educe(Default = defaults::build::feed::path())]
    pub path: PathBuf,

    /// Channel title, defaults to `[base].title`.
    #[serde(default)]
    pub title: Option<String>,

    /// Carry the rendered page as `content:encoded`.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub full_content: bool,
}

/// `[build.sitemap]` section
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SitemapConfig {
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    #[serde(default = "defaults::build::sitemap::path")]
    #[educe(Default = defaults::build::sitemap::path())]
    pub path: PathBuf,
}

/// `[build.manifest]` section - web-app manifest.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ManifestConfig {
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    #[serde(default = "defaults::build::manifest::path")]
    #[educe(Default = defaults::build::manifest::path())]
    pub path: PathBuf,

    /// Application name, defaults to `[base].title`.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub short_name: Option<String>,

    #[serde(default = "defaults::build::manifest::start_url")]
    #[educe(Default = defaults::build::manifest::start_url())]
    pub start_url: String,

    #[serde(default = "defaults::build::manifest::background_color")]
    #[educe(Default = defaults::build::manifest::background_color())]
    pub background_color: String,

    #[serde(default = "defaults::build::manifest::theme_color")]
    #[educe(Default = defaults::build::manifest::theme_color())]
    pub theme_color: String,

    #[serde(default = "defaults::build::manifest::display")]
    #[educe(Default = defaults::build::manifest::display())]
    pub display: String,

    /// Source image for the generated icons, relative to the project root.
    #[serde(default = "defaults::build::manifest::icon")]
    #[educe(Default = defaults::build::manifest::icon())]
    pub icon: Option<PathBuf>,

    #[serde(default = "defaults::build::manifest::icon_sizes")]
    #[educe(Default = defaults::build::manifest::icon_sizes())]
    pub icon_sizes: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::*;

    #[test]
    fn test_build_config_defaults() {
        let config: SiteConfig = toml::from_str(
            r#"
            [base]
            title = "Test"
            description = "Test"
        "#,
        )
        .unwrap();

        assert_eq!(config.build.content, PathBuf::from("content/blog"));
        assert_eq!(config.build.assets, PathBuf::from("content/assets"));
        assert_eq!(config.build.output, PathBuf::from("public"));
        assert_eq!(config.build.transform.chain[0], "markdown");
        assert_eq!(config.build.images.max_width, 590);
        assert_eq!(
            config.build.images.formats,
            vec![ImageFormat::Webp, ImageFormat::Jpeg]
        );
        assert!(config.build.images.show_captions);
        assert_eq!(config.build.highlight.prompt.user, "root");
        assert!(!config.build.highlight.prompt.global);
        assert_eq!(config.build.reading_time.words_per_minute, 200);
        assert_eq!(config.build.feed.path, PathBuf::from("rss.xml"));
        assert_eq!(config.build.manifest.display, "minimal-ui");
    }

    #[test]
    fn test_image_formats_parse() {
        let config: SiteConfig = toml::from_str(
            r#"
            [base]
            title = "Test"
            description = "Test"
            [build.images]
            widths = [320, 640]
            formats = ["avif", "webp", "png"]
        "#,
        )
        .unwrap();

        assert_eq!(config.build.images.widths, vec![320, 640]);
        assert_eq!(
            config.build.images.formats,
            vec![ImageFormat::Avif, ImageFormat::Webp, ImageFormat::Png]
        );
    }

    #[test]
    fn test_unknown_image_format_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str(
            r#"
            [base]
            title = "Test"
            description = "Test"
            [build.images]
            formats = ["bmp"]
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_image_format_extension_and_mime() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::Webp.mime(), "image/webp");
        assert_eq!(ImageFormat::Avif.extension(), "avif");
    }
}
