//! `markdown` stage: Markdown → HTML.
//!
//! Tables, strikethrough and task lists are always on; footnotes, smart
//! punctuation and heading ids follow `[build.markdown]`. Headings get a
//! slugified `id` unique within the page, plus a `#` anchor link from `h2`
//! down.

use super::{Artifact, Transformer, hash_config};
use crate::content::ContentNode;
use crate::context::BuildContext;
use crate::utils::slug::slugify;
use anyhow::Result;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html::push_html};
use rustc_hash::FxHashMap;

pub struct Markdown;

impl Transformer for Markdown {
    fn name(&self) -> &str {
        "markdown"
    }

    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> Result<()> {
        hash_config(hasher, &ctx.config.build.markdown)
    }

    fn transform(&self, _node: &ContentNode, input: &Artifact, ctx: &BuildContext) -> Result<Artifact> {
        let config = &ctx.config.build.markdown;

        let mut options =
            Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
        if config.footnotes {
            options |= Options::ENABLE_FOOTNOTES;
        }
        if config.smart_punctuation {
            options |= Options::ENABLE_SMART_PUNCTUATION;
        }
        if config.heading_ids {
            options |= Options::ENABLE_HEADING_ATTRIBUTES;
        }

        let parser = Parser::new_ext(&input.html, options);
        let mut html = String::with_capacity(input.html.len() * 2);
        if config.heading_ids {
            push_html(&mut html, inject_heading_anchors(parser).into_iter());
        } else {
            push_html(&mut html, parser);
        }

        Ok(input.with_html(html))
    }
}

const fn level_num(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Replace `Start(Heading)` with a raw `<hN id="...">` for headings without
/// an explicit `{#id}`. Repeated slugs get `-1`, `-2`, ... suffixes.
fn inject_heading_anchors<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut events: Vec<Event<'a>> = Vec::new();
    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    let mut in_heading: Option<HeadingLevel> = None;
    let mut heading_text = String::new();
    let mut heading_events: Vec<Event<'a>> = Vec::new();

    for event in parser {
        match &event {
            Event::Start(Tag::Heading { level, id: None, .. }) => {
                in_heading = Some(*level);
                heading_text.clear();
                heading_events.clear();
            }
            Event::End(TagEnd::Heading(level)) if in_heading == Some(*level) => {
                let n = level_num(*level);
                let base = slugify(&heading_text);
                let slug = match seen.get_mut(&base) {
                    Some(count) => {
                        *count += 1;
                        format!("{base}-{count}")
                    }
                    None => {
                        seen.insert(base.clone(), 0);
                        base
                    }
                };

                if slug.is_empty() {
                    events.push(Event::Html(format!("<h{n}>").into()));
                } else {
                    events.push(Event::Html(format!("<h{n} id=\"{slug}\">").into()));
                }
                events.append(&mut heading_events);
                if n >= 2 && !slug.is_empty() {
                    events.push(Event::Html(
                        format!(" <a class=\"anchor\" href=\"#{slug}\" aria-hidden=\"true\">#</a>")
                            .into(),
                    ));
                }
                events.push(Event::Html(format!("</h{n}>\n").into()));
                in_heading = None;
            }
            Event::Text(text) | Event::Code(text) if in_heading.is_some() => {
                heading_text.push_str(text);
                heading_events.push(event);
            }
            _ if in_heading.is_some() => heading_events.push(event),
            _ => events.push(event),
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::content::test_support::node;
    use crate::context::test_support::context;

    fn render(config: SiteConfig, body: &str) -> String {
        let ctx = context(config);
        let n = node("a.md", body);
        let input = Artifact {
            html: n.raw_body.clone(),
            ..Artifact::default()
        };
        Markdown.transform(&n, &input, &ctx).unwrap().html
    }

    #[test]
    fn test_basic_markdown() {
        let html = render(SiteConfig::default(), "Some *emphasis* and `code`.\n");
        assert_eq!(html, "<p>Some <em>emphasis</em> and <code>code</code>.</p>\n");
    }

    #[test]
    fn test_heading_ids_and_anchors() {
        let html = render(SiteConfig::default(), "# Title\n\n## Intro\n\n## Intro\n");
        assert!(html.contains("<h1 id=\"title\">Title</h1>"));
        assert!(html.contains("<h2 id=\"intro\">Intro <a class=\"anchor\" href=\"#intro\""));
        assert!(html.contains("<h2 id=\"intro-1\">"));
    }

    #[test]
    fn test_explicit_heading_id_kept() {
        let html = render(SiteConfig::default(), "## Hello {#custom}\n");
        assert!(html.contains("id=\"custom\""));
        assert!(!html.contains("anchor"));
    }

    #[test]
    fn test_heading_ids_disabled() {
        let mut config = SiteConfig::default();
        config.build.markdown.heading_ids = false;
        let html = render(config, "## Intro\n");
        assert_eq!(html, "<h2>Intro</h2>\n");
    }

    #[test]
    fn test_smart_punctuation_toggle() {
        let html = render(SiteConfig::default(), "\"quoted\" -- dash...\n");
        assert!(html.contains('\u{201c}'));
        assert!(html.contains('\u{2013}'));
        assert!(html.contains('\u{2026}'));

        let mut config = SiteConfig::default();
        config.build.markdown.smart_punctuation = false;
        let html = render(config, "\"quoted\"\n");
        assert!(html.contains("&quot;quoted&quot;"));
    }

    #[test]
    fn test_gfm_extensions() {
        let html = render(
            SiteConfig::default(),
            "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n\nNote[^1]\n\n[^1]: Footnote.\n",
        );
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("type=\"checkbox\""));
        assert!(html.contains("footnote-reference"));
    }

    #[test]
    fn test_fenced_code_language_class() {
        let html = render(SiteConfig::default(), "```rust\nfn main() {}\n```\n");
        assert!(html.contains("<pre><code class=\"language-rust\">fn main() {}\n</code></pre>"));
    }
}
