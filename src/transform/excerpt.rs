//! `excerpt` stage: summary text in `data.excerpt`.
//!
//! Front-matter `description` is used verbatim when present. Otherwise the
//! plain text of the page (code blocks and figures excluded) is pruned to
//! `[build.excerpt].length` characters on a word boundary.

use super::{Artifact, Transformer, hash_config};
use crate::content::ContentNode;
use crate::context::BuildContext;
use crate::utils::xml::plain_text;
use anyhow::Result;

pub const DATA_KEY: &str = "excerpt";

/// Elements whose text never appears in an excerpt.
const SKIPPED: &[&[u8]] = &[b"pre", b"figure", b"picture", b"table", b"sup"];

pub struct Excerpt;

impl Transformer for Excerpt {
    fn name(&self) -> &str {
        DATA_KEY
    }

    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> Result<()> {
        hash_config(hasher, &ctx.config.build.excerpt)
    }

    fn transform(&self, node: &ContentNode, input: &Artifact, ctx: &BuildContext) -> Result<Artifact> {
        let excerpt = match node.description() {
            Some(description) => description.to_owned(),
            None => prune(
                &plain_text(&input.html, SKIPPED),
                ctx.config.build.excerpt.length,
            ),
        };

        let mut output = input.clone();
        output
            .data
            .insert(DATA_KEY.to_owned(), serde_json::Value::String(excerpt));
        Ok(output)
    }
}

/// Cut `text` to at most `length` characters plus `…`, breaking between
/// words when possible.
pub fn prune(text: &str, length: usize) -> String {
    if text.chars().count() <= length {
        return text.to_owned();
    }

    let cut = text
        .char_indices()
        .nth(length)
        .map_or(text.len(), |(i, _)| i);
    let head = &text[..cut];
    // Keep the whole head if the cut already falls on a boundary.
    let head = if text[cut..].starts_with(char::is_whitespace) {
        head
    } else {
        head.rfind(char::is_whitespace).map_or(head, |i| &head[..i])
    };

    let head = head.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'));
    format!("{head}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::content::test_support::node;
    use crate::context::test_support::context;

    fn excerpt(config: SiteConfig, text: &str, html: &str) -> String {
        let ctx = context(config);
        let input = Artifact {
            html: html.to_owned(),
            ..Artifact::default()
        };
        let out = Excerpt.transform(&node("a.md", text), &input, &ctx).unwrap();
        out.data[DATA_KEY].as_str().unwrap().to_owned()
    }

    #[test]
    fn test_description_wins() {
        let value = excerpt(
            SiteConfig::default(),
            "---\ndescription: Hand written.\n---\n",
            "<p>Generated text.</p>",
        );
        assert_eq!(value, "Hand written.");
    }

    #[test]
    fn test_pruned_on_word_boundary() {
        let mut config = SiteConfig::default();
        config.build.excerpt.length = 12;
        let value = excerpt(config, "", "<p>Hello brave new world</p>");
        assert_eq!(value, "Hello brave…");
    }

    #[test]
    fn test_short_text_and_skipped_blocks() {
        let value = excerpt(
            SiteConfig::default(),
            "",
            "<p>Intro.</p><pre><code>code()</code></pre><p>Outro.</p>",
        );
        assert_eq!(value, "Intro. Outro.");
    }

    #[test]
    fn test_prune() {
        assert_eq!(prune("abc", 3), "abc");
        assert_eq!(prune("abcdef", 3), "abc…");
        assert_eq!(prune("one two three", 7), "one two…");
        assert_eq!(prune("one, two", 5), "one…");
        assert_eq!(prune("héllo wörld", 8), "héllo…");
    }
}
