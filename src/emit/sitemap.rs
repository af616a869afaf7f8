//! Sitemap listing the home page and every page.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/</loc>
//!     <lastmod>2025-01-01</lastmod>
//!   </url>
//! </urlset>
//! ```

use crate::config::SiteConfig;
use crate::context::page_url;
use crate::graph::SiteGraph;
use crate::utils::date::format_ymd;
use crate::utils::xml::escape_xml;
use chrono::{DateTime, Utc};
use std::fmt::Write;

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

struct UrlEntry {
    loc: String,
    /// `YYYY-MM-DD`
    lastmod: Option<String>,
}

pub fn render(graph: &SiteGraph, config: &SiteConfig) -> String {
    let root = config.base.url_root();

    let home = UrlEntry {
        loc: format!("{root}/"),
        lastmod: graph.pages().filter_map(|n| n.date()).max().map(|d| format_ymd(&d)),
    };
    let pages = graph.pages().map(|node| UrlEntry {
        loc: format!("{root}{}", page_url(node.slug())),
        lastmod: Some(format_ymd(
            &node
                .date()
                .unwrap_or_else(|| DateTime::<Utc>::from(node.content.last_modified)),
        )),
    });

    into_xml(std::iter::once(home).chain(pages))
}

fn into_xml(entries: impl Iterator<Item = UrlEntry>) -> String {
    let mut xml = String::with_capacity(4096);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    let _ = writeln!(xml, r#"<urlset xmlns="{SITEMAP_NS}">"#);

    for entry in entries {
        xml.push_str("  <url>\n");
        let _ = writeln!(xml, "    <loc>{}</loc>", escape_xml(&entry.loc));
        if let Some(lastmod) = entry.lastmod {
            let _ = writeln!(xml, "    <lastmod>{lastmod}</lastmod>");
        }
        xml.push_str("  </url>\n");
    }

    xml.push_str("</urlset>\n");
    xml
}
