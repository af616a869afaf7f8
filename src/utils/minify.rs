//! Minification utilities for HTML and XML.
//!
//! Provides a unified `minify` function that handles both HTML and XML,
//! with automatic enable/disable based on `[build].minify`.

use std::borrow::Cow;

// ============================================================================
// Types
// ============================================================================

/// Content type for minification.
pub enum MinifyType<'a> {
    /// HTML content
    Html(&'a [u8]),
    /// XML content
    Xml(&'a [u8]),
}

// ============================================================================
// Unified Minify Function
// ============================================================================

/// Minify content based on type.
///
/// Returns `Cow::Borrowed` if minify disabled, `Cow::Owned` if minified.
pub fn minify(content: MinifyType<'_>, enabled: bool) -> Cow<'_, [u8]> {
    match (content, enabled) {
        (MinifyType::Html(html), false) | (MinifyType::Xml(html), false) => Cow::Borrowed(html),
        (MinifyType::Html(html), true) => Cow::Owned(minify_html_inner(html)),
        (MinifyType::Xml(xml), true) => Cow::Owned(minify_xml_inner(xml)),
    }
}

// ============================================================================
// Internal Implementation
// ============================================================================

/// Minify HTML content using `minify_html` crate.
fn minify_html_inner(html: &[u8]) -> Vec<u8> {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    minify_html::minify(html, &cfg)
}

/// Minify XML by removing indentation and blank lines.
fn minify_xml_inner(xml: &[u8]) -> Vec<u8> {
    let xml_str = std::str::from_utf8(xml).unwrap_or("");
    xml_str
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("")
        .into_bytes()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minify_disabled_borrows() {
        let html = b"<p>  hello  </p>";
        let out = minify(MinifyType::Html(html), false);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(&*out, html);
    }

    #[test]
    fn test_minify_html_strips_comments() {
        let html = b"<html><head></head><body><!-- note --><p>hi</p></body></html>";
        let out = minify(MinifyType::Html(html), true);
        let out = std::str::from_utf8(&out).unwrap();
        assert!(!out.contains("note"));
        assert!(out.contains("<p>hi</p>"));
    }

    #[test]
    fn test_minify_xml_joins_lines() {
        let xml = b"<urlset>\n  <url>\n    <loc>https://example.com/</loc>\n  </url>\n</urlset>\n";
        let out = minify(MinifyType::Xml(xml), true);
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            "<urlset><url><loc>https://example.com/</loc></url></urlset>"
        );
    }
}
