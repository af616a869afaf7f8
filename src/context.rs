//! Explicit state shared by every stage of a build pass.

use crate::config::SiteConfig;
use crate::content::{AssetTable, ContentNode};
use crate::imaging::ImageProcessor;
use crate::transform::{DerivedNode, StageCache, TransformError};
use crate::utils::hash;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

// ============================================================================
// Route Table
// ============================================================================

/// Source path → slug for every loaded node, used to rewrite links between
/// pages before the graph exists.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: FxHashMap<PathBuf, String>,
    fingerprint: String,
}

impl RouteTable {
    pub fn new<'a>(nodes: impl IntoIterator<Item = &'a ContentNode>) -> Self {
        let routes: FxHashMap<PathBuf, String> = nodes
            .into_iter()
            .map(|node| (node.source_path.clone(), node.slug.clone()))
            .collect();

        let mut pairs: Vec<_> = routes.iter().collect();
        pairs.sort_unstable();
        let mut hasher = blake3::Hasher::new();
        for (path, slug) in pairs {
            hash::update_field(&mut hasher, path.to_string_lossy().as_bytes());
            hash::update_field(&mut hasher, slug.as_bytes());
        }

        Self {
            routes,
            fingerprint: hash::finish_hex(&hasher),
        }
    }

    pub fn slug_for(&self, source: &Path) -> Option<&str> {
        self.routes.get(source).map(String::as_str)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Site-relative URL of a page.
pub fn page_url(slug: &str) -> String {
    format!("/{slug}/")
}

// ============================================================================
// Insertion Queue
// ============================================================================

/// Outcome of transforming one node, sent to the graph writer.
pub struct Submission {
    pub node: Arc<ContentNode>,
    /// Generation of the source path when the chain started.
    pub generation: u64,
    pub result: Result<Vec<Arc<DerivedNode>>, TransformError>,
}

/// Sending half of the graph insertion queue.
#[derive(Clone)]
pub struct GraphQueue {
    sender: Sender<Submission>,
}

impl GraphQueue {
    pub fn channel() -> (Self, Receiver<Submission>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }

    /// Submit a result. Returns `false` once the writer has gone away.
    pub fn submit(&self, submission: Submission) -> bool {
        self.sender.send(submission).is_ok()
    }
}

// ============================================================================
// Build Context
// ============================================================================

/// Everything a stage may read during a pass.
#[derive(Clone)]
pub struct BuildContext {
    pub config: Arc<SiteConfig>,
    pub routes: Arc<RouteTable>,
    pub assets: Arc<AssetTable>,
    pub images: Arc<ImageProcessor>,
    pub cache: Arc<StageCache>,
    pub queue: GraphQueue,
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::test_support::node;

    #[test]
    fn test_route_table() {
        let a = node("posts/a.md", "---\nslug: first\n---\n");
        let b = node("posts/b.md", "");
        let routes = RouteTable::new([&a, &b]);
        assert_eq!(routes.slug_for(&a.source_path), Some("first"));
        assert_eq!(routes.slug_for(&b.source_path), Some("posts/b"));
        assert_eq!(routes.slug_for(Path::new("/nope.md")), None);

        let again = RouteTable::new([&b, &a]);
        assert_eq!(routes.fingerprint(), again.fingerprint());

        let other = RouteTable::new([&a]);
        assert_ne!(routes.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_page_url() {
        assert_eq!(page_url("posts/a"), "/posts/a/");
    }

    #[test]
    fn test_queue_reports_closed_receiver() {
        let (queue, receiver) = GraphQueue::channel();
        let submission = || Submission {
            node: Arc::new(node("a.md", "")),
            generation: 0,
            result: Ok(Vec::new()),
        };
        assert!(queue.submit(submission()));
        assert_eq!(receiver.try_iter().count(), 1);
        drop(receiver);
        assert!(!queue.submit(submission()));
    }
}
