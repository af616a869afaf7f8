//! Asset index.
//!
//! Every non-markdown file under the content root and the assets root,
//! keyed by absolute path with its content hash. Stages resolve image and
//! link references against it; its fingerprint feeds stage cache keys.

use super::loader::{is_content_file, is_ignored_name};
use crate::utils::hash;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    /// Short hash of the absolute path.
    pub id: String,
    /// Full blake3 of the file contents.
    pub content_hash: String,
}

#[derive(Debug, Default, Clone)]
pub struct AssetTable {
    entries: FxHashMap<PathBuf, AssetEntry>,
    fingerprint: String,
}

impl AssetTable {
    /// Index every asset under `roots`. Missing roots are skipped.
    pub fn scan(roots: &[&Path]) -> Self {
        let files: Vec<PathBuf> = roots
            .iter()
            .filter(|root| root.is_dir())
            .flat_map(|root| {
                WalkDir::new(root)
                    .into_iter()
                    .filter_entry(|e| e.depth() == 0 || !is_ignored_name(e.file_name()))
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && !is_content_file(e.path()))
                    .map(|e| e.into_path())
            })
            .collect();

        let entries = files
            .into_par_iter()
            .filter_map(|path| {
                let bytes = fs::read(&path).ok()?;
                let entry = AssetEntry {
                    id: hash::path_id(&path),
                    content_hash: hash::digest(&bytes),
                };
                Some((path, entry))
            })
            .collect();

        Self::from_entries(entries)
    }

    fn from_entries(entries: FxHashMap<PathBuf, AssetEntry>) -> Self {
        let mut keys: Vec<_> = entries.iter().collect();
        keys.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut hasher = blake3::Hasher::new();
        for (path, entry) in keys {
            hash::update_field(&mut hasher, path.to_string_lossy().as_bytes());
            hash::update_field(&mut hasher, entry.content_hash.as_bytes());
        }

        Self {
            entries,
            fingerprint: hash::finish_hex(&hasher),
        }
    }

    pub fn get(&self, path: &Path) -> Option<&AssetEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash over every `(path, content hash)` pair.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Resolve a reference found in content against the directory of the
/// referencing file. A leading `/` resolves against `site_root` instead.
///
/// The reference is percent-decoded and `.`/`..` are folded lexically, so
/// the result can be looked up in an [`AssetTable`].
pub fn resolve_reference(base_dir: &Path, site_root: &Path, reference: &str) -> PathBuf {
    let reference = reference
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let decoded = urlencoding::decode(reference)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| reference.to_owned());

    let joined = match decoded.strip_prefix('/') {
        Some(rest) => site_root.join(rest),
        None => base_dir.join(&decoded),
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_indexes_assets_only() {
        let dir = TempDir::new().unwrap();
        let content = dir.path().join("content");
        let assets = dir.path().join("assets");
        fs::create_dir_all(content.join("post")).unwrap();
        fs::create_dir_all(&assets).unwrap();
        fs::write(content.join("post/index.md"), "x").unwrap();
        fs::write(content.join("post/a.png"), "png").unwrap();
        fs::write(assets.join("icon.png"), "icon").unwrap();
        fs::write(assets.join(".DS_Store"), "").unwrap();

        let table = AssetTable::scan(&[&content, &assets, &dir.path().join("missing")]);
        assert_eq!(table.len(), 2);
        assert!(table.contains(&content.join("post/a.png")));
        assert!(table.contains(&assets.join("icon.png")));
        assert_eq!(
            table.get(&assets.join("icon.png")).unwrap().content_hash,
            hash::digest(b"icon")
        );
    }

    #[test]
    fn test_fingerprint_tracks_contents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), "one").unwrap();
        let first = AssetTable::scan(&[dir.path()]);
        let again = AssetTable::scan(&[dir.path()]);
        assert_eq!(first.fingerprint(), again.fingerprint());

        fs::write(dir.path().join("a.png"), "two").unwrap();
        let changed = AssetTable::scan(&[dir.path()]);
        assert_ne!(first.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_resolve_reference() {
        let base = Path::new("/site/content/posts/hello");
        let root = Path::new("/site/content");
        assert_eq!(
            resolve_reference(base, root, "./img/a%20b.png"),
            Path::new("/site/content/posts/hello/img/a b.png")
        );
        assert_eq!(
            resolve_reference(base, root, "../shared/x.pdf?dl=1#page"),
            Path::new("/site/content/posts/shared/x.pdf")
        );
        assert_eq!(
            resolve_reference(base, root, "/assets/logo.png"),
            Path::new("/site/content/assets/logo.png")
        );
    }
}
