//! Content loading.
//!
//! Walks the content root and produces immutable [`ContentNode`]s: the
//! markdown body, parsed front-matter and identity of one source file.
//! Non-markdown files are indexed separately in the [`AssetTable`].

mod assets;
mod front_matter;
mod loader;

pub use assets::{AssetEntry, AssetTable, resolve_reference};
pub use front_matter::{FrontMatter, FrontMatterError, FrontValue, parse_front_matter};
pub use loader::{ContentLoader, LoadError, is_content_file, is_ignored_name};

use crate::utils::{date::parse_date, hash};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Stable node identity: short hash of the path relative to the content root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn from_relative(relative: &Path) -> Self {
        Self(hash::path_id(relative))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One loaded source file. Never mutated after loading.
#[derive(Debug, Clone)]
pub struct ContentNode {
    pub id: NodeId,
    pub slug: String,
    pub raw_body: String,
    pub front_matter: FrontMatter,
    /// Absolute path of the source file.
    pub source_path: PathBuf,
    /// Path relative to the content root.
    pub relative_path: PathBuf,
    pub last_modified: SystemTime,
    /// blake3 of the raw file bytes.
    pub content_hash: String,
}

impl ContentNode {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn title(&self) -> Option<&str> {
        self.front_matter.get("title").and_then(FrontValue::as_str)
    }

    /// Title for display, falling back to the slug.
    pub fn display_title(&self) -> &str {
        self.title().unwrap_or(&self.slug)
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.front_matter
            .get("date")
            .and_then(FrontValue::as_str)
            .and_then(parse_date)
    }

    /// Tags from a sequence or a comma-separated string, deduplicated in
    /// declaration order.
    pub fn tags(&self) -> Vec<String> {
        let raw: Vec<String> = match self.front_matter.get("tags") {
            Some(FrontValue::Seq(items)) => items.iter().filter_map(FrontValue::to_text).collect(),
            Some(FrontValue::String(s)) => s.split(',').map(str::to_owned).collect(),
            _ => Vec::new(),
        };

        let mut tags: Vec<String> = Vec::with_capacity(raw.len());
        for tag in raw {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_owned());
            }
        }
        tags
    }

    pub fn draft(&self) -> bool {
        self.front_matter
            .get("draft")
            .and_then(FrontValue::as_bool)
            .unwrap_or(false)
    }

    pub fn description(&self) -> Option<&str> {
        self.front_matter
            .get("description")
            .and_then(FrontValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Directory containing the source file; relative references resolve
    /// against it.
    pub fn source_dir(&self) -> &Path {
        self.source_path.parent().unwrap_or(Path::new(""))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::node;
    use chrono::Datelike;

    #[test]
    fn test_accessors() {
        let n = node(
            "posts/hello.md",
            "---\ntitle: Hello\ndate: 2021-06-01\ntags: [rust, web, rust]\ndescription: ' Short '\n---\nbody",
        );
        assert_eq!(n.title(), Some("Hello"));
        assert_eq!(n.date().map(|d| d.year()), Some(2021));
        assert_eq!(n.tags(), vec!["rust", "web"]);
        assert_eq!(n.description(), Some("Short"));
        assert!(!n.draft());
        assert_eq!(n.slug(), "posts/hello");
    }

    #[test]
    fn test_comma_separated_tags_and_draft() {
        let n = node("a.md", "---\ntags: 'a, b ,, c'\ndraft: true\n---\n");
        assert_eq!(n.tags(), vec!["a", "b", "c"]);
        assert!(n.draft());
    }

    #[test]
    fn test_missing_metadata() {
        let n = node("notes/x.md", "plain body");
        assert_eq!(n.title(), None);
        assert_eq!(n.display_title(), "notes/x");
        assert_eq!(n.date(), None);
        assert!(n.tags().is_empty());
        assert_eq!(n.description(), None);
    }

    #[test]
    fn test_node_id_stable() {
        let a = node("posts/a.md", "one");
        let b = node("posts/a.md", "two");
        assert_eq!(a.id, b.id);
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(a.id.as_str().len(), crate::utils::hash::SHORT_HASH_LEN);
    }
}
