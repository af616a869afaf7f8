//! RSS feed.
//!
//! Dated pages only, newest first. The description of each item is the
//! page excerpt; the rendered page goes into `content:encoded` unless
//! `[build.feed].full_content` is off.

use super::EmitError;
use crate::config::SiteConfig;
use crate::context::page_url;
use crate::graph::{GraphNode, SiteGraph, compare_by_date};
use regex::Regex;
use rss::{CategoryBuilder, ChannelBuilder, GuidBuilder, ItemBuilder, validation::Validate};
use std::sync::LazyLock;

const GENERATOR: &str = "quill";

pub fn render(graph: &SiteGraph, config: &SiteConfig) -> Result<String, EmitError> {
    let mut pages: Vec<&GraphNode> = graph.pages().filter(|n| n.date().is_some()).collect();
    pages.sort_by(|a, b| compare_by_date(a, b));

    let items: Vec<rss::Item> = pages.iter().map(|node| item(node, config)).collect();
    let title = config
        .build
        .feed
        .title
        .clone()
        .unwrap_or_else(|| config.base.title.clone());

    let channel = ChannelBuilder::default()
        .title(title)
        .link(format!("{}/", config.base.url_root()))
        .description(config.base.description.clone())
        .language(Some(config.base.language.clone()))
        .generator(Some(GENERATOR.to_owned()))
        .last_build_date(pages.first().and_then(|n| n.date()).map(|d| d.to_rfc2822()))
        .items(items)
        .build();

    channel
        .validate()
        .map_err(|e| EmitError::Feed(e.to_string()))?;
    Ok(channel.to_string())
}

fn item(node: &GraphNode, config: &SiteConfig) -> rss::Item {
    let link = format!("{}{}", config.base.url_root(), page_url(node.slug()));
    let author = node
        .content
        .front_matter
        .get("author")
        .and_then(|v| v.as_str())
        .map(|author| normalize_author(author, config));
    let categories = node
        .tags()
        .iter()
        .map(|tag| CategoryBuilder::default().name(tag.clone()).build())
        .collect::<Vec<_>>();

    ItemBuilder::default()
        .title(Some(node.title().to_owned()))
        .link(Some(link.clone()))
        .guid(Some(GuidBuilder::default().permalink(true).value(link).build()))
        .description(node.data_str("excerpt").map(str::to_owned))
        .content(
            Some(node.html())
                .filter(|html| config.build.feed.full_content && !html.is_empty())
                .map(str::to_owned),
        )
        .pub_date(node.date().map(|d| d.to_rfc2822()))
        .author(author)
        .categories(categories)
        .build()
}

/// RSS wants `email@example.com (Name)`.
///
/// A page author already in that form is kept; otherwise the site author
/// is used, combined with the site email when needed.
fn normalize_author(author: &str, config: &SiteConfig) -> String {
    static RE_VALID_AUTHOR: LazyLock<Option<Regex>> = LazyLock::new(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}[ \t]*\([^)]+\)$").ok()
    });
    let is_valid = |s: &str| RE_VALID_AUTHOR.as_ref().is_some_and(|re| re.is_match(s));

    if is_valid(author) {
        return author.to_owned();
    }
    let site_author = &config.base.author;
    if is_valid(site_author) {
        return site_author.clone();
    }
    format!("{} ({})", config.base.email, site_author)
}
