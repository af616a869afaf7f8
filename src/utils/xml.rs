//! XML processing utilities.
//!
//! Transform stages rewrite HTML fragments as an event stream. The reader is
//! configured leniently since Markdown output and raw inline HTML are not
//! well-formed XML (void elements, valueless attributes, bare `&`).

use anyhow::Result;
use quick_xml::{
    Reader, Writer,
    events::{BytesEnd, BytesStart, BytesText, Event},
};
use std::borrow::Cow;
use std::io::Cursor;

pub type XmlWriter = Writer<Cursor<Vec<u8>>>;

// ============================================================================
// Reader / Writer Creation
// ============================================================================

/// Create a configured XML reader from content bytes
#[inline]
pub fn create_xml_reader(content: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    // Raw HTML may hold a bare `&`; report it as text.
    reader.config_mut().allow_dangling_amp = true;
    reader
}

/// Create a writer with capacity for roughly `len` bytes of output.
#[inline]
pub fn create_xml_writer(len: usize) -> XmlWriter {
    Writer::new(Cursor::new(Vec::with_capacity(len)))
}

/// Consume the writer and return the produced markup.
pub fn into_string(writer: XmlWriter) -> String {
    String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned()
}

/// Stream `html` through `on_start`, passing every other event unchanged.
///
/// `on_start` receives start and empty elements; the flag is `true` for
/// empty (self-closing) elements. It returns `false` to fall back to
/// writing the element untouched.
pub fn rewrite_elements<F>(html: &str, mut on_start: F) -> Result<String>
where
    F: FnMut(&BytesStart<'_>, bool, &mut XmlWriter) -> Result<bool>,
{
    let mut reader = create_xml_reader(html.as_bytes());
    let mut writer = create_xml_writer(html.len());

    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) => {
                if !on_start(&elem, false, &mut writer)? {
                    writer.write_event(Event::Start(elem))?;
                }
            }
            Ok(Event::Empty(elem)) => {
                if !on_start(&elem, true, &mut writer)? {
                    writer.write_event(Event::Empty(elem))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(event) => writer.write_event(event)?,
            Err(e) => anyhow::bail!(
                "HTML parse error at position {}: {:?}",
                reader.error_position(),
                e
            ),
        }
    }

    Ok(into_string(writer))
}

// ============================================================================
// Element Helpers
// ============================================================================

/// Element name as an owned string.
pub fn elem_name(elem: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(elem.name().as_ref()).into_owned()
}

/// Read an attribute value, unescaped.
pub fn get_attr(elem: &BytesStart<'_>, name: &str) -> Option<String> {
    elem.html_attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name.as_bytes())
        .map(|attr| {
            let raw = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
            match quick_xml::escape::unescape(&raw) {
                Ok(unescaped) => unescaped.into_owned(),
                Err(_) => raw,
            }
        })
}

/// Rebuild an element with transformed attributes.
///
/// Returned values are written verbatim, so they must already be escaped.
pub fn rebuild_elem<F>(elem: &BytesStart<'_>, mut transform: F) -> BytesStart<'static>
where
    F: FnMut(&[u8], Cow<'_, [u8]>) -> Cow<'static, [u8]>,
{
    let tag = elem_name(elem);
    let attrs: Vec<_> = elem
        .html_attributes()
        .flatten()
        .map(|attr| {
            let key = attr.key.as_ref().to_vec();
            let value = transform(attr.key.as_ref(), attr.value);
            (key, value)
        })
        .collect();

    let mut new_elem = BytesStart::new(tag);
    for (k, v) in attrs {
        new_elem.push_attribute((k.as_slice(), v.as_ref()));
    }
    new_elem
}

/// Build a start element from `(name, value)` pairs; values are escaped.
pub fn build_elem(tag: &str, attrs: &[(&str, &str)]) -> BytesStart<'static> {
    let mut elem = BytesStart::new(tag.to_owned());
    for (k, v) in attrs {
        elem.push_attribute((*k, *v));
    }
    elem
}

// ============================================================================
// Element Writers
// ============================================================================

/// Write `<tag attrs...>`.
#[inline]
pub fn write_start(writer: &mut XmlWriter, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
    writer.write_event(Event::Start(build_elem(tag, attrs)))?;
    Ok(())
}

/// Write `</tag>`.
#[inline]
pub fn write_end(writer: &mut XmlWriter, tag: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Write a text element: `<tag>text</tag>`.
#[inline]
pub fn write_text_element(writer: &mut XmlWriter, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Write an empty element with attributes: `<tag attr1="val1" ... />`.
#[inline]
pub fn write_empty_elem(writer: &mut XmlWriter, tag: &str, attrs: &[(&str, &str)]) -> Result<()> {
    writer.write_event(Event::Empty(build_elem(tag, attrs)))?;
    Ok(())
}

// ============================================================================
// Plain Text
// ============================================================================

/// Text content of an HTML fragment, skipping the bodies of `skip` elements.
///
/// Block-level boundaries become a single space so words do not merge.
pub fn plain_text(html: &str, skip: &[&[u8]]) -> String {
    let mut reader = create_xml_reader(html.as_bytes());
    let mut out = String::with_capacity(html.len() / 2);
    let mut skipping = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) => {
                if skipping > 0 || skip.contains(&elem.name().as_ref()) {
                    skipping += 1;
                } else if is_block(elem.name().as_ref()) {
                    out.push(' ');
                }
            }
            Ok(Event::End(elem)) => {
                if skipping > 0 {
                    skipping -= 1;
                } else if is_block(elem.name().as_ref()) {
                    out.push(' ');
                }
            }
            Ok(Event::Empty(elem)) if skipping == 0 && elem.name().as_ref() == b"br" => {
                out.push(' ');
            }
            Ok(Event::Text(text)) if skipping == 0 => {
                out.push_str(&String::from_utf8_lossy(&text));
            }
            Ok(Event::CData(text)) if skipping == 0 => {
                out.push_str(&String::from_utf8_lossy(&text));
            }
            Ok(Event::GeneralRef(entity)) if skipping == 0 => {
                let name = String::from_utf8_lossy(&entity);
                match decode_entity(&name) {
                    Some(c) => out.push(c),
                    None => {
                        out.push('&');
                        out.push_str(&name);
                        out.push(';');
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_block(name: &[u8]) -> bool {
    matches!(
        name,
        b"p" | b"div"
            | b"li"
            | b"ul"
            | b"ol"
            | b"h1"
            | b"h2"
            | b"h3"
            | b"h4"
            | b"h5"
            | b"h6"
            | b"blockquote"
            | b"pre"
            | b"table"
            | b"tr"
            | b"td"
            | b"th"
            | b"figure"
            | b"figcaption"
    )
}

/// Resolve a predefined or numeric character reference (without `&`/`;`).
pub fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

// ============================================================================
// Escaping
// ============================================================================

/// Escape the five XML special characters.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_passthrough() {
        let html = r#"<p>Hello <em>world</em> &amp; friends</p><img src="a.png" alt="x"/>"#;
        let out = rewrite_elements(html, |_, _, _| Ok(false)).unwrap();
        assert!(out.contains("<em>world</em>"));
        assert!(out.contains("&amp; friends"));
        assert!(out.contains(r#"src="a.png""#));
    }

    #[test]
    fn test_bare_ampersand_in_raw_html() {
        let html = "<div>Tom & Jerry</div><p>a &amp; b</p>";
        let out = rewrite_elements(html, |_, _, _| Ok(false)).unwrap();
        assert_eq!(out, html);
        assert_eq!(plain_text(html, &[]), "Tom & Jerry a & b");
    }

    #[test]
    fn test_rewrite_replaces_element() {
        let html = r#"<p><a href="x.md">link</a></p>"#;
        let out = rewrite_elements(html, |elem, _, writer| {
            if elem.name().as_ref() != b"a" {
                return Ok(false);
            }
            let new = rebuild_elem(elem, |key, value| {
                if key == b"href" {
                    Cow::Borrowed(b"/x/".as_slice())
                } else {
                    Cow::Owned(value.into_owned())
                }
            });
            writer.write_event(Event::Start(new))?;
            Ok(true)
        })
        .unwrap();
        assert_eq!(out, r#"<p><a href="/x/">link</a></p>"#);
    }

    #[test]
    fn test_get_attr() {
        let html = r#"<code class="language-rust extra" data-x="a &amp; b">"#;
        let mut reader = create_xml_reader(html.as_bytes());
        let Ok(Event::Start(elem)) = reader.read_event() else {
            panic!("expected start element");
        };
        assert_eq!(get_attr(&elem, "data-x").as_deref(), Some("a & b"));
        assert_eq!(get_attr(&elem, "class").as_deref(), Some("language-rust extra"));
        assert_eq!(get_attr(&elem, "missing"), None);
    }

    #[test]
    fn test_valueless_attribute_survives() {
        let html = r#"<iframe src="https://x" allowfullscreen></iframe>"#;
        let out = rewrite_elements(html, |elem, empty, writer| {
            let new = rebuild_elem(elem, |_, v| Cow::Owned(v.into_owned()));
            if empty {
                writer.write_event(Event::Empty(new))?;
            } else {
                writer.write_event(Event::Start(new))?;
            }
            Ok(true)
        })
        .unwrap();
        assert!(out.contains("allowfullscreen"));
        assert!(out.contains(r#"src="https://x""#));
    }

    #[test]
    fn test_write_helpers() {
        let mut writer = create_xml_writer(64);
        write_start(&mut writer, "div", &[("class", "a\"b")]).unwrap();
        write_text_element(&mut writer, "span", "1 < 2").unwrap();
        write_empty_elem(&mut writer, "br", &[]).unwrap();
        write_end(&mut writer, "div").unwrap();
        let out = into_string(writer);
        assert_eq!(out, r#"<div class="a&quot;b"><span>1 &lt; 2</span><br/></div>"#);
    }

    #[test]
    fn test_plain_text() {
        let html = "<h2 id=\"x\">Title</h2><p>Tom &amp; Jerry&#39;s <em>show</em></p>\
                    <pre><code>let x = 1;</code></pre><p>end<br/>line</p>";
        assert_eq!(plain_text(html, &[]), "Title Tom & Jerry's show let x = 1; end line");
        assert_eq!(plain_text(html, &[b"pre"]), "Title Tom & Jerry's show end line");
    }

    #[test]
    fn test_decode_entity() {
        assert_eq!(decode_entity("amp"), Some('&'));
        assert_eq!(decode_entity("#x41"), Some('A'));
        assert_eq!(decode_entity("#8212"), Some('\u{2014}'));
        assert_eq!(decode_entity("bogus"), None);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a & b"), "a &amp; b");
        assert_eq!(escape_xml("<'\">"), "&lt;&apos;&quot;&gt;");
    }
}
