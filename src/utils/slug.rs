//! URL slugification.
//!
//! Turns paths, titles and tags into URL-safe slugs. Non-ASCII text is
//! transliterated with `deunicode` so `Café à Paris` becomes `cafe-a-paris`.

use deunicode::deunicode;
use std::path::Path;

/// Slugify a single segment: transliterate, lowercase, collapse every run of
/// non-alphanumeric characters to one `-`, and trim `-` from both ends.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    let mut prev_hyphen = true; // suppress leading hyphen

    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            prev_hyphen = false;
        } else if !prev_hyphen {
            slug.push('-');
            prev_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Slugify a `/`-separated slug, keeping the separators.
///
/// Empty segments are dropped, so `"/Posts//Hello World/"` → `"posts/hello-world"`.
pub fn slugify_path_str(path: &str) -> String {
    path.split('/')
        .map(slugify)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive a slug from a content path relative to the content root.
///
/// | Relative path | Slug |
/// |---------------|------|
/// | `posts/hello.md` | `posts/hello` |
/// | `posts/hello/index.md` | `posts/hello` |
/// | `index.md` | `index` |
pub fn slug_from_relative_path(relative: &Path) -> String {
    let stem = relative.with_extension("");
    let mut segments: Vec<String> = stem
        .components()
        .map(|c| slugify(&c.as_os_str().to_string_lossy()))
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() > 1 && segments.last().is_some_and(|s| s == "index") {
        segments.pop();
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Hello   World  "), "hello-world");
        assert_eq!(slugify("Rust: 2024 Edition!"), "rust-2024-edition");
    }

    #[test]
    fn test_slugify_unicode_transliteration() {
        assert_eq!(slugify("Café à Paris"), "cafe-a-paris");
        assert_eq!(slugify("Über"), "uber");
    }

    #[test]
    fn test_slugify_only_symbols() {
        assert_eq!(slugify("<>:?*#"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_slugify_path_str() {
        assert_eq!(slugify_path_str("/Posts//Hello World/"), "posts/hello-world");
        assert_eq!(slugify_path_str("a"), "a");
    }

    #[test]
    fn test_slug_from_relative_path() {
        assert_eq!(slug_from_relative_path(Path::new("posts/hello.md")), "posts/hello");
        assert_eq!(
            slug_from_relative_path(Path::new("posts/Hello World/index.md")),
            "posts/hello-world"
        );
        assert_eq!(slug_from_relative_path(Path::new("index.md")), "index");
        assert_eq!(slug_from_relative_path(Path::new("a.md")), "a");
    }
}
