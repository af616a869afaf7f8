//! `highlight` stage: Prism-compatible markup for fenced code.
//!
//! ```html
//! <div class="highlight" data-language="bash">
//!   <pre class="language-bash line-numbers command-line" data-user="root" data-host="localhost">
//!     <code class="language-bash">…
//!       <span class="token keyword">echo</span> …
//!       <span aria-hidden="true" class="line-numbers-rows"><span></span>…</span>
//!       <span aria-hidden="true" class="command-line-prompt"><span data-user="root" data-host="localhost"></span>…</span>
//!     </code>
//!   </pre>
//! </div>
//! ```
//!
//! Code is tokenized at build time with syntect and each scope stack is
//! mapped onto a Prism token class. The outermost mapped scope wins, so a
//! whole string literal is one `token string`. Languages syntect does not
//! know are emitted as escaped plain text. Code blocks without a language
//! are tagged `language-text`.

use super::{Artifact, Transformer, hash_config};
use crate::config::HighlightConfig;
use crate::content::ContentNode;
use crate::context::BuildContext;
use crate::utils::xml::{
    XmlWriter, create_xml_reader, create_xml_writer, decode_entity, get_attr, into_string,
    write_end, write_start,
};
use anyhow::Result;
use quick_xml::events::{BytesStart, BytesText, Event};
use std::sync::LazyLock;
use syntect::parsing::{ParseState, Scope, ScopeStack, SyntaxSet};

const DEFAULT_LANGUAGE: &str = "text";

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

/// TextMate scope prefix → Prism token class. More specific prefixes first.
static TOKENS: LazyLock<Vec<(Scope, &'static str)>> = LazyLock::new(|| {
    [
        ("comment", "comment"),
        ("string.regexp", "regex"),
        ("string", "string"),
        ("constant.numeric", "number"),
        ("constant.language", "boolean"),
        ("constant.character", "char"),
        ("constant", "constant"),
        ("keyword.operator", "operator"),
        ("keyword", "keyword"),
        ("storage", "keyword"),
        ("entity.name.function", "function"),
        ("support.function", "function"),
        ("variable.function", "function"),
        ("entity.name.tag", "tag"),
        ("entity.other.attribute-name", "attr-name"),
        ("entity.name", "class-name"),
        ("support.type", "class-name"),
        ("support.class", "class-name"),
        ("variable.parameter", "parameter"),
        ("variable.language", "keyword"),
        ("punctuation", "punctuation"),
    ]
    .into_iter()
    .filter_map(|(prefix, token)| Scope::new(prefix).ok().map(|scope| (scope, token)))
    .collect()
});

pub struct Highlight;

impl Transformer for Highlight {
    fn name(&self) -> &str {
        "highlight"
    }

    fn fingerprint(&self, ctx: &BuildContext, hasher: &mut blake3::Hasher) -> Result<()> {
        hash_config(hasher, &ctx.config.build.highlight)
    }

    fn transform(&self, _node: &ContentNode, input: &Artifact, ctx: &BuildContext) -> Result<Artifact> {
        let config = &ctx.config.build.highlight;
        let mut reader = create_xml_reader(input.html.as_bytes());
        let mut writer = create_xml_writer(input.html.len() + 256);

        let mut pending_pre: Option<BytesStart<'static>> = None;
        let mut block: Option<Block> = None;
        // A rewritten block's `</pre>` must also close the wrapper `<div>`.
        let mut close_wrapper = false;

        loop {
            let event = match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(event) => event.into_owned(),
                Err(e) => anyhow::bail!(
                    "HTML parse error at position {}: {:?}",
                    reader.error_position(),
                    e
                ),
            };

            if let Some(pre) = pending_pre.take() {
                match &event {
                    Event::Start(code) if code.name().as_ref() == b"code" => {
                        let language = language_of(code);
                        let b = Block::new(language, config);
                        b.write_open(&mut writer, config)?;
                        block = Some(b);
                        continue;
                    }
                    _ => writer.write_event(Event::Start(pre))?,
                }
            }

            match event {
                Event::Start(elem) if elem.name().as_ref() == b"pre" && block.is_none() => {
                    pending_pre = Some(elem);
                }
                Event::Text(text) if block.is_some() => {
                    if let Some(b) = block.as_mut() {
                        b.code.push_str(&String::from_utf8_lossy(&text));
                    }
                }
                Event::GeneralRef(entity) if block.is_some() => {
                    if let Some(b) = block.as_mut() {
                        let name = String::from_utf8_lossy(&entity);
                        match decode_entity(&name) {
                            Some(c) => b.code.push(c),
                            None => {
                                b.code.push('&');
                                b.code.push_str(&name);
                                b.code.push(';');
                            }
                        }
                    }
                }
                Event::End(elem) if elem.name().as_ref() == b"code" && block.is_some() => {
                    if let Some(b) = block.take() {
                        b.write_code(&mut writer)?;
                        b.write_rows(&mut writer, config)?;
                    }
                    writer.write_event(Event::End(elem))?;
                    close_wrapper = true;
                }
                Event::End(elem) if elem.name().as_ref() == b"pre" && close_wrapper => {
                    writer.write_event(Event::End(elem))?;
                    write_end(&mut writer, "div")?;
                    close_wrapper = false;
                }
                event => writer.write_event(event)?,
            }
        }

        Ok(input.with_html(into_string(writer)))
    }
}

fn language_of(code: &BytesStart<'_>) -> String {
    get_attr(code, "class")
        .and_then(|classes| {
            classes
                .split_whitespace()
                .find_map(|c| c.strip_prefix("language-"))
                .map(str::to_owned)
        })
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned())
}

fn token_of(stack: &ScopeStack) -> Option<&'static str> {
    stack.as_slice().iter().find_map(|scope| {
        TOKENS
            .iter()
            .find(|(prefix, _)| prefix.is_prefix_of(*scope))
            .map(|(_, token)| *token)
    })
}

/// Split `code` into runs sharing one Prism token class.
fn tokenize(code: &str, language: &str) -> Result<Vec<(Option<&'static str>, String)>> {
    let Some(syntax) = SYNTAXES.find_syntax_by_token(language) else {
        return Ok(vec![(None, code.to_owned())]);
    };

    let mut state = ParseState::new(syntax);
    let mut stack = ScopeStack::new();
    let mut runs: Vec<(Option<&'static str>, String)> = Vec::new();
    let mut push = |token: Option<&'static str>, text: &str| {
        if text.is_empty() {
            return;
        }
        match runs.last_mut() {
            Some((last, buf)) if *last == token => buf.push_str(text),
            _ => runs.push((token, text.to_owned())),
        }
    };

    for line in code.split_inclusive('\n') {
        let ops = state.parse_line(line, &SYNTAXES)?;
        let mut start = 0;
        for (offset, op) in ops {
            push(token_of(&stack), &line[start..offset]);
            stack.apply(&op)?;
            start = offset;
        }
        push(token_of(&stack), &line[start..]);
    }
    Ok(runs)
}

/// A code block being rewritten.
struct Block {
    language: String,
    command_line: bool,
    /// Unescaped code text.
    code: String,
}

impl Block {
    fn new(language: String, config: &HighlightConfig) -> Self {
        let command_line = config.prompt.global
            || config
                .command_line_languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&language));
        Self {
            language,
            command_line,
            code: String::new(),
        }
    }

    /// A trailing newline does not open a line.
    fn lines(&self) -> usize {
        self.code.lines().count().max(1)
    }

    fn write_code(&self, writer: &mut XmlWriter) -> Result<()> {
        for (token, text) in tokenize(&self.code, &self.language)? {
            match token {
                Some(token) => {
                    let class = format!("token {token}");
                    write_start(writer, "span", &[("class", class.as_str())])?;
                    writer.write_event(Event::Text(BytesText::new(&text)))?;
                    write_end(writer, "span")?;
                }
                None => writer.write_event(Event::Text(BytesText::new(&text)))?,
            }
        }
        Ok(())
    }

    fn write_open(&self, writer: &mut XmlWriter, config: &HighlightConfig) -> Result<()> {
        let class = format!("language-{}", self.language);
        let mut pre_class = class.clone();
        if config.line_numbers {
            pre_class.push_str(" line-numbers");
        }

        write_start(
            writer,
            "div",
            &[("class", "highlight"), ("data-language", self.language.as_str())],
        )?;
        if self.command_line {
            pre_class.push_str(" command-line");
            write_start(
                writer,
                "pre",
                &[
                    ("class", pre_class.as_str()),
                    ("data-user", config.prompt.user.as_str()),
                    ("data-host", config.prompt.host.as_str()),
                ],
            )?;
        } else {
            write_start(writer, "pre", &[("class", pre_class.as_str())])?;
        }
        write_start(writer, "code", &[("class", class.as_str())])
    }

    /// Rows go inside `<code>` right before it closes.
    fn write_rows(&self, writer: &mut XmlWriter, config: &HighlightConfig) -> Result<()> {
        let lines = self.lines();
        if config.line_numbers {
            write_start(
                writer,
                "span",
                &[("aria-hidden", "true"), ("class", "line-numbers-rows")],
            )?;
            for _ in 0..lines {
                write_start(writer, "span", &[])?;
                write_end(writer, "span")?;
            }
            write_end(writer, "span")?;
        }
        if self.command_line {
            write_start(
                writer,
                "span",
                &[("aria-hidden", "true"), ("class", "command-line-prompt")],
            )?;
            for _ in 0..lines {
                write_start(
                    writer,
                    "span",
                    &[
                        ("data-user", config.prompt.user.as_str()),
                        ("data-host", config.prompt.host.as_str()),
                    ],
                )?;
                write_end(writer, "span")?;
            }
            write_end(writer, "span")?;
        }
        Ok(())
    }
}
