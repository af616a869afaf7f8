//! Minimal built-in HTML layout for pages and listings.

use crate::config::SiteConfig;
use crate::context::page_url;
use crate::graph::{GraphNode, Query, SiteGraph, compare_by_date};
use crate::utils::date::{format_long, format_ymd};
use crate::utils::slug::slugify;
use crate::utils::xml::escape_xml;
use std::fmt::Write;
use std::path::PathBuf;

const EXCERPT_KEY: &str = "excerpt";
const READING_TIME_KEY: &str = "reading_time";

pub fn page_path(slug: &str) -> PathBuf {
    PathBuf::from(slug).join("index.html")
}

pub fn tag_url(tag: &str) -> String {
    format!("/tags/{}/", slugify(tag))
}

pub fn tag_path(tag: &str) -> PathBuf {
    PathBuf::from("tags").join(slugify(tag)).join("index.html")
}

pub fn render_page(node: &GraphNode, config: &SiteConfig) -> String {
    let mut body = String::with_capacity(node.html().len() + 512);
    body.push_str("<article>\n");
    let _ = writeln!(body, "<h1>{}</h1>", escape_xml(node.title()));

    let meta = page_meta(node);
    if !meta.is_empty() {
        let _ = writeln!(body, r#"<p class="meta">{meta}</p>"#);
    }

    body.push_str(node.html());
    body.push('\n');

    if !node.tags().is_empty() {
        body.push_str("<ul class=\"tags\">\n");
        for tag in node.tags() {
            let _ = writeln!(
                body,
                r#"<li><a href="{}">{}</a></li>"#,
                escape_xml(&tag_url(tag)),
                escape_xml(tag)
            );
        }
        body.push_str("</ul>\n");
    }
    body.push_str("</article>\n");

    layout(config, Some(node.title()), node.data_str(EXCERPT_KEY), &body)
}

pub fn render_home(graph: &SiteGraph, config: &SiteConfig) -> String {
    let mut pages: Vec<&GraphNode> = graph.pages().collect();
    pages.sort_by(|a, b| compare_by_date(a, b));

    let mut body = String::new();
    if !config.base.summary.is_empty() {
        let _ = writeln!(
            body,
            r#"<p class="bio">{} {}</p>"#,
            escape_xml(&config.base.author),
            escape_xml(&config.base.summary)
        );
    }
    listing(&mut body, pages);
    layout(config, None, Some(&config.base.description), &body)
}

pub fn render_tag(graph: &SiteGraph, tag: &str, config: &SiteConfig) -> String {
    let mut pages: Vec<&GraphNode> = graph.query(Query::Tag(tag)).collect();
    pages.sort_by(|a, b| compare_by_date(a, b));

    let heading = format!("Tagged “{tag}”");
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", escape_xml(&heading));
    listing(&mut body, pages);
    layout(config, Some(&heading), None, &body)
}

/// Date and reading time line under a title.
fn page_meta(node: &GraphNode) -> String {
    let mut parts = Vec::with_capacity(2);
    if let Some(date) = node.date() {
        parts.push(format!(
            r#"<time datetime="{}">{}</time>"#,
            format_ymd(&date),
            format_long(&date)
        ));
    }
    let reading_time = node
        .artifact()
        .and_then(|a| a.data.get(READING_TIME_KEY))
        .and_then(|v| v.get("text"))
        .and_then(serde_json::Value::as_str);
    if let Some(text) = reading_time {
        parts.push(escape_xml(text));
    }
    parts.join(" · ")
}

fn listing<'a>(body: &mut String, pages: impl IntoIterator<Item = &'a GraphNode>) {
    body.push_str("<ul class=\"posts\">\n");
    for node in pages {
        body.push_str("<li>");
        let _ = write!(
            body,
            r#"<h2><a href="{}">{}</a></h2>"#,
            escape_xml(&page_url(node.slug())),
            escape_xml(node.title())
        );
        let meta = page_meta(node);
        if !meta.is_empty() {
            let _ = write!(body, "<small>{meta}</small>");
        }
        if let Some(excerpt) = node.data_str(EXCERPT_KEY) {
            let _ = write!(body, "<p>{}</p>", escape_xml(excerpt));
        }
        body.push_str("</li>\n");
    }
    body.push_str("</ul>\n");
}

fn layout(config: &SiteConfig, title: Option<&str>, description: Option<&str>, body: &str) -> String {
    let site = &config.base.title;
    let title = match title {
        Some(title) => format!("{title} | {site}"),
        None => site.clone(),
    };

    let mut html = String::with_capacity(body.len() + 1024);
    html.push_str("<!DOCTYPE html>\n");
    let _ = writeln!(html, r#"<html lang="{}">"#, escape_xml(&config.base.language));
    html.push_str("<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    let _ = writeln!(html, "<title>{}</title>", escape_xml(&title));
    if let Some(description) = description.filter(|d| !d.is_empty()) {
        let _ = writeln!(
            html,
            r#"<meta name="description" content="{}">"#,
            escape_xml(description)
        );
    }
    if config.build.feed.enable {
        let _ = writeln!(
            html,
            r#"<link rel="alternate" type="application/rss+xml" title="{}" href="/{}">"#,
            escape_xml(site),
            escape_xml(&config.build.feed.path.to_string_lossy())
        );
    }
    if config.build.manifest.enable {
        let _ = writeln!(
            html,
            r#"<link rel="manifest" href="/{}">"#,
            escape_xml(&config.build.manifest.path.to_string_lossy())
        );
        let _ = writeln!(
            html,
            r#"<meta name="theme-color" content="{}">"#,
            escape_xml(&config.build.manifest.theme_color)
        );
    }
    html.push_str("</head>\n<body>\n");
    let _ = writeln!(html, r#"<header><a href="/">{}</a></header>"#, escape_xml(site));
    html.push_str("<main>\n");
    html.push_str(body);
    html.push_str("</main>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::test_support::node;
    use crate::transform::{Artifact, DerivedNode};
    use std::sync::Arc;

    fn insert(graph: &mut SiteGraph, relative: &str, text: &str, artifact: Artifact) {
        let n = node(relative, text);
        let derived = Arc::new(DerivedNode {
            parent_id: n.id.clone(),
            stage_name: "excerpt".into(),
            output: artifact,
            cache_key: "k".into(),
        });
        graph.insert(Arc::new(n), vec![derived]).unwrap();
    }

    fn config() -> SiteConfig {
        let mut config = SiteConfig::default();
        config.base.title = "Blog".into();
        config
    }

    #[test]
    fn test_render_page() {
        let mut graph = SiteGraph::new();
        let mut artifact = Artifact {
            html: "<p>Body</p>".into(),
            ..Artifact::default()
        };
        artifact.data.insert(EXCERPT_KEY.into(), "Short & sweet".into());
        artifact.data.insert(
            READING_TIME_KEY.into(),
            serde_json::json!({"minutes": 1, "words": 2, "text": "1 min read"}),
        );
        insert(
            &mut graph,
            "hello.md",
            "---\ntitle: Hello <World>\ndate: 2021-06-01\ntags: [Rust Lang]\n---\n",
            artifact,
        );

        let html = render_page(graph.pages().next().unwrap(), &config());
        assert!(html.contains("<title>Hello &lt;World&gt; | Blog</title>"));
        assert!(html.contains(r#"<meta name="description" content="Short &amp; sweet">"#));
        assert!(html.contains(r#"<time datetime="2021-06-01">June 01, 2021</time> · 1 min read"#));
        assert!(html.contains("<p>Body</p>"));
        assert!(html.contains(r#"<a href="/tags/rust-lang/">Rust Lang</a>"#));
    }

    #[test]
    fn test_home_newest_first() {
        let mut graph = SiteGraph::new();
        insert(&mut graph, "old.md", "---\ndate: 2021-01-01\n---\n", Artifact::default());
        insert(&mut graph, "new.md", "---\ndate: 2021-06-01\n---\n", Artifact::default());

        let html = render_home(&graph, &config());
        assert!(html.find("/new/").unwrap() < html.find("/old/").unwrap());
        assert!(html.contains("<title>Blog</title>"));
    }

    #[test]
    fn test_tag_listing() {
        let mut graph = SiteGraph::new();
        insert(&mut graph, "a.md", "---\ntags: [rust]\n---\n", Artifact::default());
        insert(&mut graph, "b.md", "---\ntags: [web]\n---\n", Artifact::default());

        let html = render_tag(&graph, "rust", &config());
        assert!(html.contains(r#"href="/a/""#));
        assert!(!html.contains(r#"href="/b/""#));
        assert_eq!(tag_path("Rust Lang"), PathBuf::from("tags/rust-lang/index.html"));
    }
}
