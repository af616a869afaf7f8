//! `[base]` section configuration.
//!
//! Site metadata used by page layouts, the feed and the web-app manifest.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `[base]` section in quill.toml - basic site metadata.
///
/// # Example
/// ```toml
/// [base]
/// title = "My Blog"
/// description = "A personal blog about Rust"
/// author = "Alice"
/// url = "https://myblog.com"
///
/// [base.social]
/// twitter = "alice"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Site title displayed in browser tab and headers.
    pub title: String,

    /// Author name for feed and meta tags.
    #[serde(default = "defaults::base::author")]
    #[educe(Default = defaults::base::author())]
    pub author: String,

    /// One-line author bio shown on the home listing.
    #[serde(default)]
    pub summary: String,

    /// Author email for the feed.
    #[serde(default = "defaults::base::email")]
    #[educe(Default = defaults::base::email())]
    pub email: String,

    /// Site description for SEO meta tags and the feed channel.
    pub description: String,

    /// Base URL for absolute links in feed/sitemap.
    /// Required when `[build.feed]` or `[build.sitemap]` is enabled.
    #[serde(default = "defaults::base::url")]
    #[educe(Default = defaults::base::url())]
    pub url: Option<String>,

    /// BCP 47 language code (e.g., "en", "fr-FR").
    #[serde(default = "defaults::base::language")]
    #[educe(Default = defaults::base::language())]
    pub language: String,

    /// Social handles, keyed by network (`twitter = "alice"`).
    #[serde(default)]
    pub social: BTreeMap<String, String>,
}

impl BaseConfig {
    /// Base URL without a trailing slash, empty when unset.
    pub fn url_root(&self) -> &str {
        self.url.as_deref().unwrap_or_default().trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;

    #[test]
    fn test_base_config_full() {
        let config = r#"
            [base]
            title = "Hassen's blog"
            description = "A personal blog talking about development"
            url = "https://htaidirt.com/"
            author = "Hassen Taidirt"
            summary = "who lives and works in Paris"
            language = "en-US"

            [base.social]
            twitter = "htaidirt"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.base.title, "Hassen's blog");
        assert_eq!(config.base.author, "Hassen Taidirt");
        assert_eq!(config.base.url.as_deref(), Some("https://htaidirt.com/"));
        assert_eq!(config.base.url_root(), "https://htaidirt.com");
        assert_eq!(config.base.social["twitter"], "htaidirt");
    }

    #[test]
    fn test_base_config_defaults() {
        let config = r#"
            [base]
            title = "Test"
            description = "Test blog"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.base.author, "<YOUR_NAME>");
        assert_eq!(config.base.email, "user@noreply.quill");
        assert_eq!(config.base.language, "en");
        assert_eq!(config.base.url, None);
        assert_eq!(config.base.url_root(), "");
        assert!(config.base.social.is_empty());
    }

    #[test]
    fn test_unknown_field_rejection() {
        let config = r#"
            [base]
            title = "Test"
            description = "Test blog"
            unknown_field = "should_fail"
        "#;
        let result: Result<SiteConfig, _> = toml::from_str(config);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }
}
