//! Content root traversal.

use super::front_matter::{FrontMatterError, FrontValue, parse_front_matter};
use super::{ContentNode, NodeId};
use crate::utils::hash;
use crate::utils::slug::{slug_from_relative_path, slugify_path_str};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Extensions treated as content.
const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Per-file loading failure. Never fatal to a build pass.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("`{}` is not valid UTF-8", path.display())]
    Encoding { path: PathBuf },

    #[error("malformed front-matter in `{}`: {source}", path.display())]
    FrontMatter {
        path: PathBuf,
        source: FrontMatterError,
    },

    #[error("`{}` resolves to an empty slug", path.display())]
    EmptySlug { path: PathBuf },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. }
            | Self::Encoding { path }
            | Self::FrontMatter { path, .. }
            | Self::EmptySlug { path } => path,
        }
    }
}

/// Whether a file name is skipped during traversal (hidden files, OS noise).
pub fn is_ignored_name(name: &OsStr) -> bool {
    let name = name.to_str().unwrap_or_default();
    name.starts_with('.') || IGNORED_FILES.contains(&name)
}

/// Whether `path` is a markdown content file.
pub fn is_content_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        && !path.file_name().is_some_and(is_ignored_name)
}

/// Loads [`ContentNode`]s from a content root.
#[derive(Debug, Clone)]
pub struct ContentLoader {
    root: PathBuf,
}

impl ContentLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walk the content root in file-name order.
    ///
    /// Each call starts a fresh traversal.
    pub fn load(&self) -> impl Iterator<Item = Result<ContentNode, LoadError>> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_name(e.file_name()))
            .filter_map(move |entry| match entry {
                Ok(e) if e.file_type().is_file() && is_content_file(e.path()) => {
                    Some(self.load_file(e.path()))
                }
                Ok(_) => None,
                Err(err) => {
                    let path = err
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    Some(Err(LoadError::Io {
                        path,
                        source: err.into(),
                    }))
                }
            })
    }

    /// Load a single content file.
    pub fn load_file(&self, path: &Path) -> Result<ContentNode, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };

        let bytes = fs::read(path).map_err(io_err)?;
        let last_modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(io_err)?;
        let content_hash = hash::digest(&bytes);

        let text = String::from_utf8(bytes).map_err(|_| LoadError::Encoding {
            path: path.to_path_buf(),
        })?;
        let (front_matter, body) =
            parse_front_matter(&text).map_err(|source| LoadError::FrontMatter {
                path: path.to_path_buf(),
                source,
            })?;

        let relative_path = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default());

        let slug = match front_matter.get("slug").and_then(FrontValue::as_str) {
            Some(slug) => slugify_path_str(slug),
            None => slug_from_relative_path(&relative_path),
        };
        if slug.is_empty() {
            return Err(LoadError::EmptySlug {
                path: path.to_path_buf(),
            });
        }

        Ok(ContentNode {
            id: NodeId::from_relative(&relative_path),
            slug,
            raw_body: body.to_owned(),
            front_matter,
            source_path: path.to_path_buf(),
            relative_path,
            last_modified,
            content_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_walks_markdown_only() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.md", b"---\ntitle: B\n---\nb");
        write(dir.path(), "a/index.md", b"---\ntitle: A\n---\na");
        write(dir.path(), "a/photo.png", b"png");
        write(dir.path(), ".hidden/c.md", b"c");
        write(dir.path(), ".DS_Store", b"");

        let loader = ContentLoader::new(dir.path());
        let slugs: Vec<String> = loader.load().map(|n| n.unwrap().slug).collect();
        assert_eq!(slugs, vec!["a", "b"]);
    }

    #[test]
    fn test_load_is_restartable() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "one.md", b"1");
        write(dir.path(), "two.markdown", b"2");

        let loader = ContentLoader::new(dir.path());
        assert_eq!(loader.load().count(), 2);
        assert_eq!(loader.load().count(), 2);
    }

    #[test]
    fn test_load_file_fields() {
        let dir = TempDir::new().unwrap();
        let path = write(
            dir.path(),
            "posts/Hello World.md",
            b"---\ntitle: Hello\n---\n# Body\n",
        );

        let node = ContentLoader::new(dir.path()).load_file(&path).unwrap();
        assert_eq!(node.slug, "posts/hello-world");
        assert_eq!(node.raw_body, "# Body\n");
        assert_eq!(node.relative_path, Path::new("posts/Hello World.md"));
        assert_eq!(node.id, NodeId::from_relative(Path::new("posts/Hello World.md")));
        assert_eq!(node.title(), Some("Hello"));
    }

    #[test]
    fn test_front_matter_slug_wins() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "posts/a.md", b"---\nslug: My Post\n---\n");
        let node = ContentLoader::new(dir.path()).load_file(&path).unwrap();
        assert_eq!(node.slug, "my-post");
    }

    #[test]
    fn test_errors_are_per_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.md", b"---\ntitle: ok\n---\n");
        write(dir.path(), "bad.md", b"---\ntitle: [oops\n---\n");
        write(dir.path(), "binary.md", &[0xff, 0xfe, 0x00]);
        write(dir.path(), "empty-slug.md", b"---\nslug: '!!!'\n---\n");

        let results: Vec<_> = ContentLoader::new(dir.path()).load().collect();
        assert_eq!(results.len(), 4);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(LoadError::Encoding { .. }))));
        assert!(results.iter().any(|r| matches!(r, Err(LoadError::FrontMatter { .. }))));
        assert!(results.iter().any(|r| matches!(r, Err(LoadError::EmptySlug { .. }))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = ContentLoader::new(dir.path())
            .load_file(&dir.path().join("nope.md"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(err.path().ends_with("nope.md"));
    }

    #[test]
    fn test_is_content_file() {
        assert!(is_content_file(Path::new("a/b.md")));
        assert!(is_content_file(Path::new("a/b.MARKDOWN")));
        assert!(!is_content_file(Path::new("a/b.png")));
        assert!(!is_content_file(Path::new("a/.b.md")));
    }
}
