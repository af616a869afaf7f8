//! `reading_time` stage: estimated reading time in `data.reading_time`.

use super::{Artifact, Transformer, hash_config};
use crate::content::ContentNode;
use crate::context::BuildContext;
use crate::utils::xml::plain_text;
use anyhow::Result;
use serde::Serialize;

pub const DATA_KEY: &str = "reading_time";

#[derive(Debug, Serialize)]
struct Estimate {
    minutes: u32,
    words: u32,
    text: String,
}

pub struct ReadingTime;

impl Transformer for ReadingTime {
    fn name(&self) -> &str {
        DATA_KEY
    }

    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> Result<()> {
        hash_config(hasher, &ctx.config.build.reading_time)
    }

    fn transform(&self, _node: &ContentNode, input: &Artifact, ctx: &BuildContext) -> Result<Artifact> {
        let wpm = ctx.config.build.reading_time.words_per_minute.max(1);
        let words = u32::try_from(plain_text(&input.html, &[]).split_whitespace().count())
            .unwrap_or(u32::MAX);
        let minutes = words.div_ceil(wpm);

        let estimate = Estimate {
            minutes,
            words,
            text: format!("{minutes} min read"),
        };

        let mut output = input.clone();
        output
            .data
            .insert(DATA_KEY.to_owned(), serde_json::to_value(estimate)?);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::content::test_support::node;
    use crate::context::test_support::context;

    fn estimate(config: SiteConfig, html: &str) -> serde_json::Value {
        let ctx = context(config);
        let input = Artifact {
            html: html.to_owned(),
            ..Artifact::default()
        };
        let out = ReadingTime.transform(&node("a.md", ""), &input, &ctx).unwrap();
        assert_eq!(out.html, html);
        out.data[DATA_KEY].clone()
    }

    #[test]
    fn test_rounds_up_to_whole_minutes() {
        let html = format!("<p>{}</p>", "word ".repeat(201));
        let value = estimate(SiteConfig::default(), &html);
        assert_eq!(
            value,
            serde_json::json!({"minutes": 2, "words": 201, "text": "2 min read"})
        );
    }

    #[test]
    fn test_custom_speed_and_markup_ignored() {
        let mut config = SiteConfig::default();
        config.build.reading_time.words_per_minute = 2;
        let value = estimate(config, "<p>one <em>two</em></p><p>three</p>");
        assert_eq!(value["words"], 3);
        assert_eq!(value["minutes"], 2);
    }

    #[test]
    fn test_empty_document() {
        let value = estimate(SiteConfig::default(), "");
        assert_eq!(value["minutes"], 0);
        assert_eq!(value["text"], "0 min read");
    }
}
